//! Traversal engine
//!
//! Breadth-first traversal and hop-count paths over one tenant partition.
//! Every call holds the partition read lock for its whole run, so it sees a
//! consistent graph as of call time. Output order is insertion-stable: it
//! follows edge insertion order and is not stable across runs separated by
//! mutations.

pub mod path;

pub use path::{Path, PathOptions};

use crate::audit::{Actor, AuditDraft, AuditEventType, TargetKind};
use crate::graph::{Direction, EdgeId, EdgeType, GraphError, GraphResult, GraphStore, IntelligenceNode, NodeId, TenantGraph, TenantId};
use crate::llm::{with_timeout, PathNarrator, PathTriple};
use crate::persistence::Journal;
use path::shortest_hop_path;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct TraversalRequest {
    pub start: NodeId,
    pub direction: Direction,
    pub max_depth: usize,
    /// Follow only these edge types
    pub edge_types: Option<Vec<EdgeType>>,
}

impl TraversalRequest {
    pub fn new(start: NodeId, direction: Direction, max_depth: usize) -> Self {
        TraversalRequest {
            start,
            direction,
            max_depth,
            edge_types: None,
        }
    }

    pub fn edge_types(mut self, edge_types: Vec<EdgeType>) -> Self {
        self.edge_types = Some(edge_types);
        self
    }
}

/// A node reached by a traversal at its minimum depth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalHit {
    pub node: IntelligenceNode,
    pub depth: usize,
    /// Node ids from the start node to this node, both included
    pub path: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
}

/// Path plus its best-effort narrative
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainedPath {
    pub path: Path,
    pub triples: Vec<PathTriple>,
    pub explanation: Option<String>,
    /// True when the explanation was omitted
    pub degraded: bool,
}

pub struct TraversalEngine {
    store: Arc<GraphStore>,
    journal: Arc<Journal>,
    narrator: Option<Arc<dyn PathNarrator>>,
    depth_limit: usize,
    collaborator_timeout: Duration,
}

impl TraversalEngine {
    pub fn new(
        store: Arc<GraphStore>,
        journal: Arc<Journal>,
        narrator: Option<Arc<dyn PathNarrator>>,
        depth_limit: usize,
        collaborator_timeout: Duration,
    ) -> Self {
        TraversalEngine {
            store,
            journal,
            narrator,
            depth_limit,
            collaborator_timeout,
        }
    }

    fn check_depth(&self, max_depth: usize) -> GraphResult<()> {
        if max_depth > self.depth_limit {
            return Err(GraphError::InvalidArgument(format!(
                "max depth {} exceeds limit {}",
                max_depth, self.depth_limit
            )));
        }
        Ok(())
    }

    /// Breadth-first traversal. The start node comes first at depth 0; every
    /// other reachable node appears once, at its minimum depth, in
    /// non-decreasing depth order.
    pub async fn traverse(
        &self,
        tenant: &TenantId,
        request: &TraversalRequest,
        cancel: &CancellationToken,
    ) -> GraphResult<Vec<TraversalHit>> {
        self.check_depth(request.max_depth)?;
        let partition = self
            .store
            .existing_partition(tenant)
            .await
            .ok_or_else(|| GraphError::node_not_found(request.start))?;
        let graph = partition.read().await;
        let hits = breadth_first(&graph, request, cancel)?;
        debug!(tenant = %tenant, start = %request.start, depth = request.max_depth, visited = hits.len(), "Traversal finished");
        Ok(hits)
    }

    /// Fewest-hop outbound path within `max_depth`, or `None`
    pub async fn find_path(&self, tenant: &TenantId, from: NodeId, to: NodeId, max_depth: usize) -> GraphResult<Option<Path>> {
        self.find_path_with(tenant, from, to, &PathOptions::new(max_depth), &CancellationToken::new())
            .await
    }

    pub async fn find_path_with(
        &self,
        tenant: &TenantId,
        from: NodeId,
        to: NodeId,
        options: &PathOptions,
        cancel: &CancellationToken,
    ) -> GraphResult<Option<Path>> {
        self.check_depth(options.max_depth)?;
        let partition = self
            .store
            .existing_partition(tenant)
            .await
            .ok_or_else(|| GraphError::node_not_found(from))?;
        let graph = partition.read().await;
        for id in [from, to] {
            if !graph.contains_node(id) {
                return Err(GraphError::node_not_found(id));
            }
        }
        let path = shortest_hop_path(&graph, from, to, options, cancel)?;
        debug!(tenant = %tenant, from = %from, to = %to, found = path.is_some(), "Path search finished");
        Ok(path)
    }

    /// Narrate `path` through the collaborator. Narration failures only
    /// drop the explanation. Writes a `Traversed` audit entry.
    pub async fn explain_path(&self, tenant: &TenantId, actor: &Actor, path: Path) -> GraphResult<ExplainedPath> {
        let triples = {
            let partition = self
                .store
                .existing_partition(tenant)
                .await
                .ok_or_else(|| GraphError::InvalidArgument("path is empty".to_string()))?;
            let graph = partition.read().await;
            path_triples(&graph, &path)?
        };

        let explanation = match self.narrator.as_ref() {
            Some(narrator) => match with_timeout(self.collaborator_timeout, narrator.explain(&triples)).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(tenant = %tenant, error = %e, "Path narration failed, returning path without explanation");
                    None
                }
            },
            None => None,
        };

        let explained = ExplainedPath {
            path,
            triples,
            degraded: explanation.is_none(),
            explanation,
        };
        let start = explained
            .path
            .start()
            .ok_or_else(|| GraphError::InvalidArgument("path is empty".to_string()))?;
        let draft = AuditDraft::new(AuditEventType::Traversed, actor, TargetKind::Path, start).new_state(&explained);
        self.journal.record(tenant, draft).await?;
        info!(tenant = %tenant, hops = explained.path.hops(), degraded = explained.degraded, "Explained path");
        Ok(explained)
    }
}

pub(crate) fn breadth_first(
    graph: &TenantGraph,
    request: &TraversalRequest,
    cancel: &CancellationToken,
) -> GraphResult<Vec<TraversalHit>> {
    let start = graph
        .node(request.start)
        .ok_or_else(|| GraphError::node_not_found(request.start))?;

    // node -> (parent, edge); the start has no parent
    let mut parents: FxHashMap<NodeId, Option<(NodeId, EdgeId)>> = FxHashMap::default();
    parents.insert(start.id, None);
    let mut hits = vec![TraversalHit {
        node: start.clone(),
        depth: 0,
        path: vec![start.id],
        edges: Vec::new(),
    }];
    let mut queue = VecDeque::from([(start.id, 0usize)]);
    let filter = request.edge_types.as_deref();

    while let Some((current, depth)) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        if depth >= request.max_depth {
            continue;
        }
        for edge in graph.neighbors(current, request.direction, filter) {
            let next = edge.other_end(current);
            if parents.contains_key(&next) {
                continue;
            }
            let Some(node) = graph.node(next) else {
                continue;
            };
            parents.insert(next, Some((current, edge.id)));
            let (path, edges) = trail(&parents, next);
            hits.push(TraversalHit {
                node: node.clone(),
                depth: depth + 1,
                path,
                edges,
            });
            queue.push_back((next, depth + 1));
        }
    }
    Ok(hits)
}

fn trail(parents: &FxHashMap<NodeId, Option<(NodeId, EdgeId)>>, to: NodeId) -> (Vec<NodeId>, Vec<EdgeId>) {
    let mut nodes = vec![to];
    let mut edges = Vec::new();
    let mut current = to;
    while let Some(Some((parent, edge))) = parents.get(&current) {
        nodes.push(*parent);
        edges.push(*edge);
        current = *parent;
    }
    nodes.reverse();
    edges.reverse();
    (nodes, edges)
}

fn path_triples(graph: &TenantGraph, path: &Path) -> GraphResult<Vec<PathTriple>> {
    if path.nodes.is_empty() || path.nodes.len() != path.edges.len() + 1 {
        return Err(GraphError::InvalidArgument("malformed path".to_string()));
    }
    path.edges
        .iter()
        .map(|id| {
            let edge = graph.edge(*id).ok_or_else(|| GraphError::edge_not_found(*id))?;
            let source = graph.node(edge.source).ok_or_else(|| GraphError::node_not_found(edge.source))?;
            let target = graph.node(edge.target).ok_or_else(|| GraphError::node_not_found(edge.target))?;
            Ok(PathTriple {
                source_label: source.label.clone(),
                edge_type: edge.edge_type,
                target_label: target.label.clone(),
            })
        })
        .collect()
}
