//! Intelgraph CLI: operates on a local intelligence graph
//!
//! Every command is scoped to one tenant and prints JSON on stdout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use intelgraph::audit::Actor;
use intelgraph::graph::{
    Direction, EdgeType, EdgeUpsert, NodeId, NodeRef, NodeType, NodeUpsert, PropertyMap, PropertyValue,
    SnapshotId, TenantId,
};
use intelgraph::search::{SearchRequest, SearchScope};
use intelgraph::traversal::{PathOptions, TraversalRequest};
use intelgraph::{EngineConfig, IntelligenceGraph};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "intelgraph", version, about = "Unified intelligence graph")]
struct Cli {
    /// YAML config file
    #[arg(long, global = true, env = "INTELGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// RocksDB directory; overrides the config file
    #[arg(long, global = true)]
    data_path: Option<PathBuf>,

    #[arg(long, global = true, default_value = "default", env = "INTELGRAPH_TENANT")]
    tenant: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upsert nodes and edges from a JSON Lines file
    Ingest { file: PathBuf },
    /// Node, edge and embedding counts
    Stats,
    /// Breadth-first traversal from a node
    Traverse {
        start: NodeId,
        #[arg(long, default_value = "outbound")]
        direction: Direction,
        #[arg(long, default_value_t = 2)]
        depth: usize,
        /// Only follow these edge types
        #[arg(long = "edge-type")]
        edge_types: Vec<EdgeType>,
    },
    /// Fewest-hop path between two nodes
    Path {
        from: NodeId,
        to: NodeId,
        #[arg(long, default_value_t = 5)]
        depth: usize,
        #[arg(long, default_value = "outbound")]
        direction: Direction,
        /// Ask the narrator to explain the path
        #[arg(long)]
        explain: bool,
    },
    /// Recompute centrality and clusters
    Analytics,
    /// Semantic search over embeddings
    Search {
        text: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
        #[arg(long, default_value_t = 0.0)]
        min_similarity: f32,
    },
    /// Refresh missing or stale embeddings
    Reembed,
    /// Create, list or delete snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Diff two snapshots
    Diff { from: SnapshotId, to: SnapshotId },
    /// Print the audit trail
    Audit {
        /// Verify the hash chain instead of printing entries
        #[arg(long)]
        verify: bool,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    Create {
        #[arg(long)]
        label: Option<String>,
    },
    List,
    Delete { id: SnapshotId },
}

/// One line of an ingest file
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum IngestRecord {
    Node {
        node_type: NodeType,
        external_source_id: String,
        label: String,
        #[serde(default)]
        properties: serde_json::Map<String, serde_json::Value>,
    },
    Edge {
        edge_type: EdgeType,
        source: IngestRef,
        target: IngestRef,
        #[serde(default)]
        weight: Option<f64>,
        #[serde(default)]
        properties: serde_json::Map<String, serde_json::Value>,
        #[serde(default)]
        external_source_id: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngestRef {
    Id(NodeId),
    External { node_type: NodeType, external_source_id: String },
}

impl From<IngestRef> for NodeRef {
    fn from(r: IngestRef) -> Self {
        match r {
            IngestRef::Id(id) => NodeRef::Id(id),
            IngestRef::External { node_type, external_source_id } => NodeRef::External { node_type, external_source_id },
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct IngestSummary {
    created: usize,
    updated: usize,
    unchanged: usize,
    failed: usize,
}

fn properties(map: serde_json::Map<String, serde_json::Value>) -> PropertyMap {
    map.into_iter().map(|(k, v)| (k, PropertyValue::from(v))).collect()
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Token cancelled on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::default(),
    }
    .apply_env()?;
    if let Some(path) = cli.data_path {
        config.data_path = Some(path);
    }

    let engine = IntelligenceGraph::open(config).context("failed to open intelligence graph")?;
    let tenant = TenantId::new(cli.tenant);
    if !tenant.is_valid() {
        bail!("invalid tenant id");
    }
    let actor = Actor::user(std::env::var("USER").unwrap_or_else(|_| "cli".to_string()));

    match cli.command {
        Commands::Ingest { file } => {
            let summary = ingest(&engine, &tenant, &actor, &file).await?;
            print(&summary)?;
        }
        Commands::Stats => print(&engine.store().tenant_stats(&tenant).await)?,
        Commands::Traverse { start, direction, depth, edge_types } => {
            let mut request = TraversalRequest::new(start, direction, depth);
            if !edge_types.is_empty() {
                request = request.edge_types(edge_types);
            }
            let hits = engine.traversal().traverse(&tenant, &request, &interrupt_token()).await?;
            print(&hits)?;
        }
        Commands::Path { from, to, depth, direction, explain } => {
            let options = PathOptions::new(depth).direction(direction);
            let path = engine
                .traversal()
                .find_path_with(&tenant, from, to, &options, &interrupt_token())
                .await?;
            match (path, explain) {
                (Some(path), true) => print(&engine.traversal().explain_path(&tenant, &actor, path).await?)?,
                (path, _) => print(&path)?,
            }
        }
        Commands::Analytics => {
            let report = engine.analytics().recompute(&tenant).await?;
            let mut centrality: Vec<_> = report.centrality.into_iter().collect();
            centrality.sort_by(|a, b| b.1.degree_centrality.total_cmp(&a.1.degree_centrality));
            print(&serde_json::json!({
                "centrality": centrality
                    .into_iter()
                    .map(|(id, c)| serde_json::json!({ "node_id": id, "scores": c }))
                    .collect::<Vec<_>>(),
                "clusters": report.clusters,
                "updated_nodes": report.updated_nodes,
            }))?;
        }
        Commands::Search { text, k, min_similarity } => {
            let request = SearchRequest::new(text, k)
                .min_similarity(min_similarity)
                .scope(SearchScope::All);
            print(&engine.search().search(&tenant, &request).await)?;
        }
        Commands::Reembed => {
            let report = engine.store().reembed_tenant(&tenant, &interrupt_token()).await?;
            print(&report)?;
        }
        Commands::Snapshot { action } => match action {
            SnapshotAction::Create { label } => {
                let snapshot = engine.snapshots().create(&tenant, &actor, label).await?;
                print(&snapshot.summary())?;
            }
            SnapshotAction::List => print(&engine.snapshots().list(&tenant).await)?,
            SnapshotAction::Delete { id } => {
                let deleted = engine.snapshots().delete(&tenant, &actor, id).await?;
                print(&serde_json::json!({ "deleted": deleted }))?;
            }
        },
        Commands::Diff { from, to } => print(&engine.snapshots().diff(&tenant, from, to).await?)?,
        Commands::Audit { verify } => {
            if verify {
                let verified = engine.audit().verify_chain(&tenant).await?;
                print(&serde_json::json!({ "tenant": tenant, "verified_entries": verified }))?;
            } else {
                print(&engine.audit().entries(&tenant).await)?;
            }
        }
    }
    Ok(())
}

async fn ingest(engine: &IntelligenceGraph, tenant: &TenantId, actor: &Actor, file: &PathBuf) -> Result<IngestSummary> {
    let reader = std::io::BufReader::new(
        std::fs::File::open(file).with_context(|| format!("cannot open {}", file.display()))?,
    );
    let mut summary = IngestSummary::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: IngestRecord =
            serde_json::from_str(&line).with_context(|| format!("line {}: invalid record", line_no + 1))?;

        let outcome = match record {
            IngestRecord::Node { node_type, external_source_id, label, properties: props } => engine
                .store()
                .upsert_node(
                    tenant,
                    actor,
                    NodeUpsert { node_type, external_source_id, label, properties: properties(props) },
                )
                .await
                .map(|(_, outcome)| outcome),
            IngestRecord::Edge { edge_type, source, target, weight, properties: props, external_source_id } => engine
                .store()
                .upsert_edge(
                    tenant,
                    actor,
                    EdgeUpsert {
                        edge_type,
                        source: source.into(),
                        target: target.into(),
                        weight,
                        properties: properties(props),
                        external_source_id,
                    },
                )
                .await
                .map(|(_, outcome)| outcome),
        };

        match outcome {
            Ok(intelgraph::graph::UpsertOutcome::Created) => summary.created += 1,
            Ok(intelgraph::graph::UpsertOutcome::Updated) => summary.updated += 1,
            Ok(intelgraph::graph::UpsertOutcome::Unchanged) => summary.unchanged += 1,
            Err(e) if e.is_retryable() => return Err(e.into()),
            Err(e) => {
                warn!(line = line_no + 1, code = e.code(), error = %e, "Skipping record");
                summary.failed += 1;
            }
        }
    }

    info!(
        tenant = %tenant,
        created = summary.created,
        updated = summary.updated,
        unchanged = summary.unchanged,
        failed = summary.failed,
        "Ingest finished"
    );
    Ok(summary)
}
