//! Tenant-partitioned graph store
//!
//! Each tenant owns one [`TenantGraph`] behind an async `RwLock`. Structural
//! mutations take the partition write lock, persist one write batch that
//! carries their audit entries, and only then touch memory, so a failed
//! commit leaves nothing behind. Readers share the lock and always see a
//! fully applied mutation.
//!
//! Lock order: partition, then node owners, then the tenant audit chain.

use super::edge::{is_valid_weight, IntelligenceEdge, DEFAULT_WEIGHT};
use super::embedding::{content_hash, EmbeddingRecord, EmbeddingTarget};
use super::error::{GraphError, GraphResult};
use super::merge::{plan_merge, MergePreview};
use super::node::IntelligenceNode;
use super::partition::{TenantGraph, TenantStats};
use super::property::{PropertyMap, PropertyValue};
use super::schema::{SchemaRegistry, RESERVED_KEYS};
use super::types::{Direction, EdgeId, EdgeType, NodeId, NodeType, TenantId};
use crate::audit::{Actor, AuditDraft, AuditEventType, TargetKind};
use crate::llm::{with_timeout, Embedder};
use crate::persistence::{Journal, WriteBatch};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Input of `create_node`
#[derive(Debug, Clone)]
pub struct NewNode {
    pub node_type: NodeType,
    pub label: String,
    pub properties: PropertyMap,
    pub external_source_id: Option<String>,
}

impl NewNode {
    pub fn new(node_type: NodeType, label: impl Into<String>) -> Self {
        NewNode {
            node_type,
            label: label.into(),
            properties: PropertyMap::new(),
            external_source_id: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_properties(mut self, properties: PropertyMap) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn with_external_source(mut self, external_source_id: impl Into<String>) -> Self {
        self.external_source_id = Some(external_source_id.into());
        self
    }
}

/// Input of `create_edge`
#[derive(Debug, Clone)]
pub struct NewEdge {
    pub edge_type: EdgeType,
    pub source: NodeId,
    pub target: NodeId,
    pub weight: Option<f64>,
    pub properties: PropertyMap,
    pub external_source_id: Option<String>,
}

impl NewEdge {
    pub fn new(edge_type: EdgeType, source: NodeId, target: NodeId) -> Self {
        NewEdge {
            edge_type,
            source,
            target,
            weight: None,
            properties: PropertyMap::new(),
            external_source_id: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_external_source(mut self, external_source_id: impl Into<String>) -> Self {
        self.external_source_id = Some(external_source_id.into());
        self
    }
}

/// Partial update of a node. Absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub label: Option<String>,
    pub set: PropertyMap,
    pub remove: Vec<String>,
    /// Reject the patch with `StaleWrite` unless the node is at this version
    pub expected_version: Option<u64>,
}

impl NodePatch {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set.insert(key.into(), value.into());
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.remove.push(key.into());
        self
    }

    pub fn expect_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Partial update of an edge
#[derive(Debug, Clone, Default)]
pub struct EdgePatch {
    pub weight: Option<f64>,
    pub set: PropertyMap,
    pub remove: Vec<String>,
    pub expected_version: Option<u64>,
}

impl EdgePatch {
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set.insert(key.into(), value.into());
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.remove.push(key.into());
        self
    }

    pub fn expect_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// How an upstream producer refers to an edge endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRef {
    Id(NodeId),
    External {
        node_type: NodeType,
        external_source_id: String,
    },
}

/// Producer record keyed by `(nodeType, externalSourceId)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUpsert {
    pub node_type: NodeType,
    pub external_source_id: String,
    pub label: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// Producer record for an edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeUpsert {
    pub edge_type: EdgeType,
    pub source: NodeRef,
    pub target: NodeRef,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default)]
    pub external_source_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct NodeQuery {
    pub node_type: Option<NodeType>,
    pub limit: Option<usize>,
}

/// Counts returned by `reembed_tenant`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReembedReport {
    pub refreshed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    Refreshed,
    Skipped,
    Failed,
}

/// Consistent copy of a tenant graph
#[derive(Debug, Clone)]
pub struct GraphCapture {
    pub nodes: Vec<IntelligenceNode>,
    pub edges: Vec<IntelligenceEdge>,
    pub stats: TenantStats,
}

/// Store settings derived from the engine configuration
#[derive(Clone)]
pub struct StoreOptions {
    pub schema: SchemaRegistry,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub collaborator_timeout: Duration,
    pub embedding_staleness: chrono::Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            schema: SchemaRegistry::default(),
            embedder: None,
            collaborator_timeout: Duration::from_secs(5),
            embedding_staleness: chrono::Duration::days(30),
        }
    }
}

pub struct GraphStore {
    partitions: RwLock<HashMap<TenantId, Arc<RwLock<TenantGraph>>>>,
    /// Owning tenant of every live node and edge, used to tell
    /// `CrossTenant` from `NotFound` on writes
    owners: RwLock<HashMap<Uuid, TenantId>>,
    journal: Arc<Journal>,
    options: StoreOptions,
}

impl GraphStore {
    pub fn new(journal: Arc<Journal>, options: StoreOptions) -> Self {
        GraphStore {
            partitions: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
            journal,
            options,
        }
    }

    /// Install a partition rebuilt from persisted records
    pub fn restore_partition(&mut self, graph: TenantGraph) {
        let tenant = graph.tenant().clone();
        let owners = self.owners.get_mut();
        for node in graph.nodes() {
            owners.insert(node.id.0, tenant.clone());
        }
        for edge in graph.edges() {
            owners.insert(edge.id.0, tenant.clone());
        }
        info!(tenant = %tenant, nodes = graph.node_count(), edges = graph.edge_count(), "Restored partition");
        self.partitions
            .get_mut()
            .insert(tenant, Arc::new(RwLock::new(graph)));
    }

    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    pub fn embedder(&self) -> Option<&Arc<dyn Embedder>> {
        self.options.embedder.as_ref()
    }

    pub fn collaborator_timeout(&self) -> Duration {
        self.options.collaborator_timeout
    }

    pub fn embedding_staleness(&self) -> chrono::Duration {
        self.options.embedding_staleness
    }

    pub async fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self.partitions.read().await.keys().cloned().collect();
        tenants.sort();
        tenants
    }

    /// Partition of `tenant`, if it has ever been written
    pub(crate) async fn existing_partition(&self, tenant: &TenantId) -> Option<Arc<RwLock<TenantGraph>>> {
        self.partitions.read().await.get(tenant).cloned()
    }

    async fn partition(&self, tenant: &TenantId) -> GraphResult<Arc<RwLock<TenantGraph>>> {
        if !tenant.is_valid() {
            return Err(GraphError::InvalidArgument(format!("invalid tenant id '{}'", tenant)));
        }
        if let Some(partition) = self.existing_partition(tenant).await {
            return Ok(partition);
        }
        let mut partitions = self.partitions.write().await;
        Ok(Arc::clone(
            partitions
                .entry(tenant.clone())
                .or_insert_with(|| Arc::new(RwLock::new(TenantGraph::new(tenant.clone())))),
        ))
    }

    /// Whether `id` is live in a tenant other than `tenant`
    async fn owned_elsewhere(&self, tenant: &TenantId, id: Uuid) -> bool {
        matches!(self.owners.read().await.get(&id), Some(owner) if owner != tenant)
    }

    /// Error for a node id referenced by a write that is not in `tenant`
    async fn missing_node(&self, tenant: &TenantId, id: NodeId) -> GraphError {
        if self.owned_elsewhere(tenant, id.0).await {
            GraphError::CrossTenant { id: id.0 }
        } else {
            GraphError::node_not_found(id)
        }
    }

    /// Error for an edge id targeted by a write that is not in `tenant`
    async fn missing_edge(&self, tenant: &TenantId, id: EdgeId) -> GraphError {
        if self.owned_elsewhere(tenant, id.0).await {
            GraphError::CrossTenant { id: id.0 }
        } else {
            GraphError::edge_not_found(id)
        }
    }

    /// Outcome of deleting an id that `tenant` does not hold: a no-op for
    /// unknown ids, `CrossTenant` for another tenant's entity
    async fn absent(&self, tenant: &TenantId, id: Uuid) -> GraphResult<bool> {
        if self.owned_elsewhere(tenant, id).await {
            Err(GraphError::CrossTenant { id })
        } else {
            Ok(false)
        }
    }

    async fn require_node(&self, graph: &TenantGraph, id: NodeId) -> GraphResult<()> {
        if graph.contains_node(id) {
            Ok(())
        } else {
            Err(self.missing_node(graph.tenant(), id).await)
        }
    }

    // ---- nodes ----

    pub async fn create_node(&self, tenant: &TenantId, actor: &Actor, new: NewNode) -> GraphResult<IntelligenceNode> {
        let partition = self.partition(tenant).await?;
        let node = {
            let mut graph = partition.write().await;
            self.insert_new_node(&mut graph, actor, new).await?
        };
        self.refresh_embedding(tenant, EmbeddingTarget::Node(node.id)).await;
        Ok(node)
    }

    async fn insert_new_node(&self, graph: &mut TenantGraph, actor: &Actor, new: NewNode) -> GraphResult<IntelligenceNode> {
        self.options.schema.validate_node(new.node_type, &new.properties)?;
        if let Some(ext) = &new.external_source_id {
            if graph.node_by_external(new.node_type, ext).is_some() {
                return Err(GraphError::duplicate_node(new.node_type, ext));
            }
        }

        let tenant = graph.tenant().clone();
        let seq = graph.allocate_seq();
        let node = IntelligenceNode::new(
            NodeId::new(),
            tenant.clone(),
            new.node_type,
            new.label,
            new.properties,
            new.external_source_id,
            seq,
        );

        let mut batch = WriteBatch::new(tenant.clone());
        batch.put_node(&node);
        let draft = AuditDraft::new(AuditEventType::Created, actor, TargetKind::Node, node.id).new_state(&node);
        self.journal.commit(batch, vec![draft]).await?;

        graph.insert_node(node.clone());
        self.owners.write().await.insert(node.id.0, tenant.clone());
        info!(tenant = %tenant, node_id = %node.id, node_type = %node.node_type, "Created node");
        Ok(node)
    }

    pub async fn update_node(
        &self,
        tenant: &TenantId,
        actor: &Actor,
        id: NodeId,
        patch: NodePatch,
    ) -> GraphResult<IntelligenceNode> {
        let Some(partition) = self.existing_partition(tenant).await else {
            return Err(self.missing_node(tenant, id).await);
        };
        let node = {
            let mut graph = partition.write().await;
            self.apply_node_patch(&mut graph, actor, id, patch).await?
        };
        if node.1 {
            self.refresh_embedding(tenant, EmbeddingTarget::Node(id)).await;
        }
        Ok(node.0)
    }

    /// Returns the node after the patch and whether anything changed
    async fn apply_node_patch(
        &self,
        graph: &mut TenantGraph,
        actor: &Actor,
        id: NodeId,
        patch: NodePatch,
    ) -> GraphResult<(IntelligenceNode, bool)> {
        let Some(current) = graph.node(id).cloned() else {
            return Err(self.missing_node(graph.tenant(), id).await);
        };
        check_version(id.0, patch.expected_version, current.version)?;
        check_reserved(current.node_type.as_str(), &patch.set, &patch.remove)?;

        let mut updated = current.clone();
        if let Some(label) = patch.label {
            updated.label = label;
        }
        apply_properties(&mut updated.properties, patch.set, &patch.remove);

        if updated.label == current.label && updated.properties == current.properties {
            return Ok((current, false));
        }
        self.options.schema.validate_node(updated.node_type, &updated.properties)?;
        updated.touch();

        let mut batch = WriteBatch::new(graph.tenant().clone());
        batch.put_node(&updated);
        let draft = AuditDraft::new(AuditEventType::Updated, actor, TargetKind::Node, id)
            .previous(&current)
            .new_state(&updated);
        self.journal.commit(batch, vec![draft]).await?;

        graph.insert_node(updated.clone());
        info!(tenant = %graph.tenant(), node_id = %id, version = updated.version, "Updated node");
        Ok((updated, true))
    }

    /// Delete a node with its incident edges and embeddings. Returns `false`
    /// when the node did not exist.
    pub async fn delete_node(&self, tenant: &TenantId, actor: &Actor, id: NodeId) -> GraphResult<bool> {
        let Some(partition) = self.existing_partition(tenant).await else {
            return self.absent(tenant, id.0).await;
        };
        let mut graph = partition.write().await;
        let Some(node) = graph.node(id).cloned() else {
            return self.absent(tenant, id.0).await;
        };

        let edges: Vec<IntelligenceEdge> = graph
            .incident_edges(id)
            .into_iter()
            .filter_map(|e| graph.edge(e).cloned())
            .collect();

        let mut batch = WriteBatch::new(tenant.clone());
        for edge in &edges {
            batch.delete_edge(edge.id);
        }
        batch.delete_node(id);
        let draft = AuditDraft::new(AuditEventType::Deleted, actor, TargetKind::Node, id)
            .previous(&serde_json::json!({ "node": node, "edges": edges }));
        self.journal.commit(batch, vec![draft]).await?;

        let mut owners = self.owners.write().await;
        for edge in &edges {
            graph.remove_edge(edge.id);
            owners.remove(&edge.id.0);
        }
        graph.remove_node(id);
        owners.remove(&id.0);
        drop(owners);
        info!(tenant = %tenant, node_id = %id, cascaded_edges = edges.len(), "Deleted node");
        Ok(true)
    }

    // ---- edges ----

    pub async fn create_edge(&self, tenant: &TenantId, actor: &Actor, new: NewEdge) -> GraphResult<IntelligenceEdge> {
        let partition = self.partition(tenant).await?;
        let edge = {
            let mut graph = partition.write().await;
            self.insert_new_edge(&mut graph, actor, new).await?
        };
        self.refresh_embedding(tenant, EmbeddingTarget::Edge(edge.id)).await;
        Ok(edge)
    }

    async fn insert_new_edge(&self, graph: &mut TenantGraph, actor: &Actor, new: NewEdge) -> GraphResult<IntelligenceEdge> {
        self.require_node(graph, new.source).await?;
        self.require_node(graph, new.target).await?;
        if new.source == new.target && !new.edge_type.allows_self_loop() {
            return Err(GraphError::InvalidSelfLoop(new.edge_type));
        }
        let weight = new.weight.unwrap_or(DEFAULT_WEIGHT);
        if !is_valid_weight(weight) {
            return Err(GraphError::InvalidArgument(format!("edge weight {} must be finite and >= 0", weight)));
        }
        self.options.schema.validate_edge(new.edge_type, &new.properties)?;
        if let Some(ext) = &new.external_source_id {
            if graph.edge_by_external(new.edge_type, ext).is_some() {
                return Err(GraphError::duplicate_edge(new.edge_type, ext));
            }
        }

        let tenant = graph.tenant().clone();
        let seq = graph.allocate_seq();
        let edge = IntelligenceEdge::new(
            EdgeId::new(),
            tenant.clone(),
            new.edge_type,
            new.source,
            new.target,
            weight,
            new.properties,
            new.external_source_id,
            seq,
        );

        let mut batch = WriteBatch::new(tenant.clone());
        batch.put_edge(&edge);
        let draft = AuditDraft::new(AuditEventType::Created, actor, TargetKind::Edge, edge.id).new_state(&edge);
        self.journal.commit(batch, vec![draft]).await?;

        graph.insert_edge(edge.clone());
        self.owners.write().await.insert(edge.id.0, tenant.clone());
        info!(
            tenant = %tenant,
            edge_id = %edge.id,
            edge_type = %edge.edge_type,
            source = %edge.source,
            target = %edge.target,
            "Created edge"
        );
        Ok(edge)
    }

    pub async fn update_edge(
        &self,
        tenant: &TenantId,
        actor: &Actor,
        id: EdgeId,
        patch: EdgePatch,
    ) -> GraphResult<IntelligenceEdge> {
        let Some(partition) = self.existing_partition(tenant).await else {
            return Err(self.missing_edge(tenant, id).await);
        };
        let (edge, changed) = {
            let mut graph = partition.write().await;
            self.apply_edge_patch(&mut graph, actor, id, patch, None).await?
        };
        if changed {
            self.refresh_embedding(tenant, EmbeddingTarget::Edge(id)).await;
        }
        Ok(edge)
    }

    async fn apply_edge_patch(
        &self,
        graph: &mut TenantGraph,
        actor: &Actor,
        id: EdgeId,
        patch: EdgePatch,
        endpoints: Option<(NodeId, NodeId)>,
    ) -> GraphResult<(IntelligenceEdge, bool)> {
        let Some(current) = graph.edge(id).cloned() else {
            return Err(self.missing_edge(graph.tenant(), id).await);
        };
        check_version(id.0, patch.expected_version, current.version)?;
        check_reserved(current.edge_type.as_str(), &patch.set, &patch.remove)?;

        let mut updated = current.clone();
        if let Some(weight) = patch.weight {
            if !is_valid_weight(weight) {
                return Err(GraphError::InvalidArgument(format!("edge weight {} must be finite and >= 0", weight)));
            }
            updated.weight = weight;
        }
        if let Some((source, target)) = endpoints {
            if source == target && !updated.edge_type.allows_self_loop() {
                return Err(GraphError::InvalidSelfLoop(updated.edge_type));
            }
            updated.source = source;
            updated.target = target;
        }
        apply_properties(&mut updated.properties, patch.set, &patch.remove);

        if updated.weight == current.weight
            && updated.properties == current.properties
            && updated.source == current.source
            && updated.target == current.target
        {
            return Ok((current, false));
        }
        self.options.schema.validate_edge(updated.edge_type, &updated.properties)?;
        updated.touch();

        let mut batch = WriteBatch::new(graph.tenant().clone());
        batch.put_edge(&updated);
        let draft = AuditDraft::new(AuditEventType::Updated, actor, TargetKind::Edge, id)
            .previous(&current)
            .new_state(&updated);
        self.journal.commit(batch, vec![draft]).await?;

        graph.insert_edge(updated.clone());
        info!(tenant = %graph.tenant(), edge_id = %id, version = updated.version, "Updated edge");
        Ok((updated, true))
    }

    /// Delete an edge. Returns `false` when it did not exist.
    pub async fn delete_edge(&self, tenant: &TenantId, actor: &Actor, id: EdgeId) -> GraphResult<bool> {
        let Some(partition) = self.existing_partition(tenant).await else {
            return self.absent(tenant, id.0).await;
        };
        let mut graph = partition.write().await;
        let Some(edge) = graph.edge(id).cloned() else {
            return self.absent(tenant, id.0).await;
        };

        let mut batch = WriteBatch::new(tenant.clone());
        batch.delete_edge(id);
        let draft = AuditDraft::new(AuditEventType::Deleted, actor, TargetKind::Edge, id).previous(&edge);
        self.journal.commit(batch, vec![draft]).await?;

        graph.remove_edge(id);
        self.owners.write().await.remove(&id.0);
        info!(tenant = %tenant, edge_id = %id, "Deleted edge");
        Ok(true)
    }

    // ---- merge ----

    /// Validate merge arguments against a locked partition; returns the
    /// distinct duplicate ids.
    async fn check_merge(&self, graph: &TenantGraph, primary: NodeId, duplicates: &[NodeId]) -> GraphResult<Vec<NodeId>> {
        self.require_node(graph, primary).await?;
        let mut distinct = Vec::with_capacity(duplicates.len());
        for id in duplicates {
            if *id == primary {
                return Err(GraphError::MergeConflict(format!("cannot merge {} into itself", primary)));
            }
            self.require_node(graph, *id).await?;
            if !distinct.contains(id) {
                distinct.push(*id);
            }
        }
        Ok(distinct)
    }

    /// Collapse `duplicates` into `primary`. Edges are re-pointed, properties
    /// unioned with primary-wins, duplicates deleted. All-or-nothing.
    pub async fn merge_nodes(
        &self,
        tenant: &TenantId,
        actor: &Actor,
        primary: NodeId,
        duplicates: &[NodeId],
    ) -> GraphResult<IntelligenceNode> {
        let Some(partition) = self.existing_partition(tenant).await else {
            return Err(self.missing_node(tenant, primary).await);
        };
        let merged = {
            let mut graph = partition.write().await;
            let duplicates = self.check_merge(&graph, primary, duplicates).await?;
            let current = graph.node(primary).cloned().ok_or_else(|| GraphError::node_not_found(primary))?;
            if duplicates.is_empty() {
                return Ok(current);
            }

            let mut plan = plan_merge(&graph, &current, &duplicates);
            plan.primary.touch();
            for edge in plan.repointed.iter_mut() {
                edge.touch();
            }

            let mut batch = WriteBatch::new(tenant.clone());
            batch.put_node(&plan.primary);
            for edge in &plan.repointed {
                batch.put_edge(edge);
            }
            for id in &plan.dropped {
                batch.delete_edge(*id);
            }
            let mut drafts = Vec::with_capacity(plan.duplicates.len());
            for dup in &plan.duplicates {
                batch.delete_node(dup.id);
                let edges = plan.duplicate_edges.get(&dup.id).cloned().unwrap_or_default();
                drafts.push(
                    AuditDraft::new(AuditEventType::Merged, actor, TargetKind::Node, dup.id)
                        .previous(&serde_json::json!({ "node": dup, "edges": edges }))
                        .new_state(&serde_json::json!({ "merged_into": primary, "node": plan.primary })),
                );
            }

            if let Err(e) = self.journal.commit(batch, drafts).await {
                warn!(tenant = %tenant, node_id = %primary, error = %e, "Merge rolled back");
                return Err(GraphError::from(e));
            }

            let mut owners = self.owners.write().await;
            for id in &plan.dropped {
                graph.remove_edge(*id);
                owners.remove(&id.0);
            }
            for edge in &plan.repointed {
                graph.insert_edge(edge.clone());
            }
            for dup in &plan.duplicates {
                graph.remove_node(dup.id);
                owners.remove(&dup.id.0);
            }
            drop(owners);
            graph.insert_node(plan.primary.clone());

            info!(
                tenant = %tenant,
                node_id = %primary,
                merged = plan.duplicates.len(),
                repointed = plan.repointed.len(),
                dropped = plan.dropped.len(),
                "Merged nodes"
            );
            plan.primary
        };
        self.refresh_embedding(tenant, EmbeddingTarget::Node(primary)).await;
        Ok(merged)
    }

    /// Compute what `merge_nodes` would do without changing the graph
    pub async fn preview_merge(
        &self,
        tenant: &TenantId,
        actor: &Actor,
        primary: NodeId,
        duplicates: &[NodeId],
    ) -> GraphResult<MergePreview> {
        let Some(partition) = self.existing_partition(tenant).await else {
            return Err(self.missing_node(tenant, primary).await);
        };
        let preview = {
            let graph = partition.read().await;
            let duplicates = self.check_merge(&graph, primary, duplicates).await?;
            let current = graph.node(primary).cloned().ok_or_else(|| GraphError::node_not_found(primary))?;
            plan_merge(&graph, &current, &duplicates).preview()
        };

        let draft = AuditDraft::new(AuditEventType::MergePreviewed, actor, TargetKind::Node, primary).new_state(&preview);
        self.journal.record(tenant, draft).await?;
        Ok(preview)
    }

    // ---- upserts ----

    /// Create or update the node keyed by `(nodeType, externalSourceId)`,
    /// following merge aliases.
    pub async fn upsert_node(
        &self,
        tenant: &TenantId,
        actor: &Actor,
        upsert: NodeUpsert,
    ) -> GraphResult<(IntelligenceNode, UpsertOutcome)> {
        let partition = self.partition(tenant).await?;
        let (node, outcome) = {
            let mut graph = partition.write().await;
            match graph.node_by_external(upsert.node_type, &upsert.external_source_id) {
                Some(id) => {
                    let patch = NodePatch {
                        label: Some(upsert.label),
                        set: upsert.properties,
                        ..Default::default()
                    };
                    let (node, changed) = self.apply_node_patch(&mut graph, actor, id, patch).await?;
                    let outcome = if changed { UpsertOutcome::Updated } else { UpsertOutcome::Unchanged };
                    (node, outcome)
                }
                None => {
                    let new = NewNode::new(upsert.node_type, upsert.label)
                        .with_properties(upsert.properties)
                        .with_external_source(upsert.external_source_id);
                    (self.insert_new_node(&mut graph, actor, new).await?, UpsertOutcome::Created)
                }
            }
        };
        if outcome != UpsertOutcome::Unchanged {
            self.refresh_embedding(tenant, EmbeddingTarget::Node(node.id)).await;
        }
        Ok((node, outcome))
    }

    async fn resolve(&self, graph: &TenantGraph, node: &NodeRef) -> GraphResult<NodeId> {
        match node {
            NodeRef::Id(id) => {
                self.require_node(graph, *id).await?;
                Ok(*id)
            }
            NodeRef::External { node_type, external_source_id } => graph
                .node_by_external(*node_type, external_source_id)
                .ok_or_else(|| {
                    GraphError::InvalidArgument(format!(
                        "no {} with external source id '{}'",
                        node_type, external_source_id
                    ))
                }),
        }
    }

    /// Create or update an edge. Keyed by `(edgeType, externalSourceId)` when
    /// present, otherwise by `(edgeType, source, target)`.
    pub async fn upsert_edge(
        &self,
        tenant: &TenantId,
        actor: &Actor,
        upsert: EdgeUpsert,
    ) -> GraphResult<(IntelligenceEdge, UpsertOutcome)> {
        let partition = self.partition(tenant).await?;
        let (edge, outcome) = {
            let mut graph = partition.write().await;
            let source = self.resolve(&graph, &upsert.source).await?;
            let target = self.resolve(&graph, &upsert.target).await?;

            let existing = match &upsert.external_source_id {
                Some(ext) => graph.edge_by_external(upsert.edge_type, ext),
                None => graph.edge_between(upsert.edge_type, source, target),
            };
            match existing {
                Some(id) => {
                    let patch = EdgePatch {
                        weight: upsert.weight,
                        set: upsert.properties,
                        ..Default::default()
                    };
                    let (edge, changed) = self
                        .apply_edge_patch(&mut graph, actor, id, patch, Some((source, target)))
                        .await?;
                    let outcome = if changed { UpsertOutcome::Updated } else { UpsertOutcome::Unchanged };
                    (edge, outcome)
                }
                None => {
                    let new = NewEdge {
                        edge_type: upsert.edge_type,
                        source,
                        target,
                        weight: upsert.weight,
                        properties: upsert.properties,
                        external_source_id: upsert.external_source_id,
                    };
                    (self.insert_new_edge(&mut graph, actor, new).await?, UpsertOutcome::Created)
                }
            }
        };
        if outcome != UpsertOutcome::Unchanged {
            self.refresh_embedding(tenant, EmbeddingTarget::Edge(edge.id)).await;
        }
        Ok((edge, outcome))
    }

    // ---- reads ----

    pub async fn get_node(&self, tenant: &TenantId, id: NodeId) -> GraphResult<IntelligenceNode> {
        let partition = self.existing_partition(tenant).await.ok_or_else(|| GraphError::node_not_found(id))?;
        let graph = partition.read().await;
        graph.node(id).cloned().ok_or_else(|| GraphError::node_not_found(id))
    }

    pub async fn get_edge(&self, tenant: &TenantId, id: EdgeId) -> GraphResult<IntelligenceEdge> {
        let partition = self.existing_partition(tenant).await.ok_or_else(|| GraphError::edge_not_found(id))?;
        let graph = partition.read().await;
        graph.edge(id).cloned().ok_or_else(|| GraphError::edge_not_found(id))
    }

    pub async fn find_node_by_external(
        &self,
        tenant: &TenantId,
        node_type: NodeType,
        external_source_id: &str,
    ) -> Option<IntelligenceNode> {
        let partition = self.existing_partition(tenant).await?;
        let graph = partition.read().await;
        let id = graph.node_by_external(node_type, external_source_id)?;
        graph.node(id).cloned()
    }

    /// Nodes in insertion order
    pub async fn list_nodes(&self, tenant: &TenantId, query: NodeQuery) -> Vec<IntelligenceNode> {
        let Some(partition) = self.existing_partition(tenant).await else {
            return Vec::new();
        };
        let graph = partition.read().await;
        graph
            .nodes()
            .filter(|n| query.node_type.map_or(true, |t| n.node_type == t))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Edges touching `node` in insertion order; empty for unknown nodes
    pub async fn find_edges_by_node(&self, tenant: &TenantId, node: NodeId, direction: Direction) -> Vec<IntelligenceEdge> {
        let Some(partition) = self.existing_partition(tenant).await else {
            return Vec::new();
        };
        let graph = partition.read().await;
        graph
            .neighbors(node, direction, None)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn get_embedding(&self, tenant: &TenantId, target: EmbeddingTarget) -> Option<EmbeddingRecord> {
        let partition = self.existing_partition(tenant).await?;
        let graph = partition.read().await;
        graph.embedding(target).cloned()
    }

    pub async fn tenant_stats(&self, tenant: &TenantId) -> TenantStats {
        match self.existing_partition(tenant).await {
            Some(partition) => partition.read().await.stats(),
            None => TenantStats::default(),
        }
    }

    /// Copy every node and edge under one read lock
    pub async fn capture(&self, tenant: &TenantId) -> GraphCapture {
        let Some(partition) = self.existing_partition(tenant).await else {
            return GraphCapture {
                nodes: Vec::new(),
                edges: Vec::new(),
                stats: TenantStats::default(),
            };
        };
        let graph = partition.read().await;
        GraphCapture {
            nodes: graph.nodes().cloned().collect(),
            edges: graph.edges().cloned().collect(),
            stats: graph.stats(),
        }
    }

    // ---- derived fields ----

    /// Overwrite centrality and PageRank on every listed node still present.
    /// Derived fields do not bump `version` or `updatedAt` and are not audited.
    pub(crate) async fn apply_centrality(
        &self,
        tenant: &TenantId,
        scores: &HashMap<NodeId, (f64, f64)>,
    ) -> GraphResult<usize> {
        self.apply_derived(tenant, |node| {
            scores.get(&node.id).map(|(degree, rank)| {
                node.centrality_score = Some(*degree);
                node.page_rank = Some(*rank);
            })
        })
        .await
    }

    pub(crate) async fn apply_clusters(&self, tenant: &TenantId, clusters: &HashMap<NodeId, u64>) -> GraphResult<usize> {
        self.apply_derived(tenant, |node| {
            clusters.get(&node.id).map(|cluster| {
                node.cluster_id = Some(*cluster);
            })
        })
        .await
    }

    async fn apply_derived<F>(&self, tenant: &TenantId, mut apply: F) -> GraphResult<usize>
    where
        F: FnMut(&mut IntelligenceNode) -> Option<()>,
    {
        let Some(partition) = self.existing_partition(tenant).await else {
            return Ok(0);
        };
        let mut graph = partition.write().await;
        let mut updated = Vec::new();
        for node in graph.nodes() {
            let mut copy = node.clone();
            if apply(&mut copy).is_none() {
                continue;
            }
            // Unchanged scores are not rewritten
            if copy.centrality_score != node.centrality_score
                || copy.page_rank != node.page_rank
                || copy.cluster_id != node.cluster_id
            {
                updated.push(copy);
            }
        }

        let mut batch = WriteBatch::new(tenant.clone());
        for node in &updated {
            batch.put_node(node);
        }
        self.journal.commit_unaudited(&batch)?;

        let count = updated.len();
        for node in updated {
            if let Some(slot) = graph.node_mut(node.id) {
                slot.centrality_score = node.centrality_score;
                slot.page_rank = node.page_rank;
                slot.cluster_id = node.cluster_id;
            }
        }
        Ok(count)
    }

    // ---- embeddings ----

    /// Re-embed `target` if its canonical text changed or its embedding is
    /// past the staleness window. Failures are logged and leave the previous
    /// embedding in place, where search reports it as stale.
    async fn refresh_embedding(&self, tenant: &TenantId, target: EmbeddingTarget) -> Refresh {
        let Some(embedder) = self.options.embedder.as_ref() else {
            return Refresh::Skipped;
        };
        let Some(partition) = self.existing_partition(tenant).await else {
            return Refresh::Skipped;
        };

        let (text, hash) = {
            let graph = partition.read().await;
            let Some(text) = graph.canonical_text(target) else {
                return Refresh::Skipped;
            };
            let hash = content_hash(&text);
            if let Some(existing) = graph.embedding(target) {
                if !existing.is_stale(Utc::now(), self.options.embedding_staleness, Some(&hash)) {
                    return Refresh::Skipped;
                }
            }
            (text, hash)
        };

        let limit = self.options.collaborator_timeout;
        let vector = match with_timeout(limit, embedder.embed(&text)).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(tenant = %tenant, target = %target.as_uuid(), error = %e, "Embedding refresh failed, keeping stale embedding");
                return Refresh::Failed;
            }
        };

        let mut graph = partition.write().await;
        // The entity may have changed while the collaborator was working.
        if graph.canonical_text(target).map(|t| content_hash(&t)) != Some(hash.clone()) {
            debug!(tenant = %tenant, target = %target.as_uuid(), "Entity changed during embedding, discarding vector");
            return Refresh::Skipped;
        }
        let record = EmbeddingRecord {
            target,
            tenant_id: tenant.clone(),
            vector,
            provider: embedder.provider(),
            generated_at: Utc::now(),
            content_hash: hash,
        };
        let mut batch = WriteBatch::new(tenant.clone());
        batch.put_embedding(&record);
        if let Err(e) = self.journal.commit_unaudited(&batch) {
            warn!(tenant = %tenant, target = %target.as_uuid(), error = %e, "Failed to persist embedding");
            return Refresh::Failed;
        }
        graph.put_embedding(record);
        debug!(tenant = %tenant, target = %target.as_uuid(), "Embedding refreshed");
        Refresh::Refreshed
    }

    /// Re-embed every node and edge whose embedding is missing or stale.
    /// The token is checked between entities; progress made before a
    /// cancellation is kept.
    pub async fn reembed_tenant(&self, tenant: &TenantId, cancel: &CancellationToken) -> GraphResult<ReembedReport> {
        let mut report = ReembedReport::default();
        let Some(partition) = self.existing_partition(tenant).await else {
            return Ok(report);
        };
        let targets: Vec<EmbeddingTarget> = {
            let graph = partition.read().await;
            graph
                .nodes()
                .map(|n| EmbeddingTarget::Node(n.id))
                .chain(graph.edges().map(|e| EmbeddingTarget::Edge(e.id)))
                .collect()
        };

        for target in targets {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.refresh_embedding(tenant, target).await {
                Refresh::Refreshed => report.refreshed += 1,
                Refresh::Failed => report.failed += 1,
                Refresh::Skipped => report.skipped += 1,
            }
        }

        info!(
            tenant = %tenant,
            refreshed = report.refreshed,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "Re-embedded tenant"
        );
        Ok(report)
    }
}

fn check_version(id: Uuid, expected: Option<u64>, actual: u64) -> GraphResult<()> {
    match expected {
        Some(expected) if expected != actual => Err(GraphError::StaleWrite { id, expected, actual }),
        _ => Ok(()),
    }
}

fn check_reserved(type_name: &str, set: &PropertyMap, remove: &[String]) -> GraphResult<()> {
    for key in RESERVED_KEYS {
        if set.contains_key(*key) || remove.iter().any(|k| k == key) {
            return Err(GraphError::SchemaViolation {
                type_name: type_name.to_string(),
                key: key.to_string(),
                reason: "reserved for analytics output".to_string(),
            });
        }
    }
    Ok(())
}

fn apply_properties(properties: &mut PropertyMap, set: PropertyMap, remove: &[String]) {
    for key in remove {
        properties.remove(key);
    }
    properties.extend(set);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::persistence::MemoryBackend;

    fn store() -> GraphStore {
        let journal = Journal::new(Arc::new(MemoryBackend::new()), AuditLog::new());
        GraphStore::new(Arc::new(journal), StoreOptions::default())
    }

    fn acme() -> TenantId {
        TenantId::new("acme")
    }

    #[tokio::test]
    async fn test_create_and_get_node() {
        let store = store();
        let actor = Actor::system();
        let node = store
            .create_node(&acme(), &actor, NewNode::new(NodeType::Person, "Alice").with_property("title", "CEO"))
            .await
            .unwrap();

        let fetched = store.get_node(&acme(), node.id).await.unwrap();
        assert_eq!(fetched.label, "Alice");
        assert_eq!(fetched.get_property("title").unwrap().as_string(), Some("CEO"));
        assert!(matches!(
            store.get_node(&TenantId::new("other"), node.id).await,
            Err(GraphError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_self_loop_and_weight() {
        let store = store();
        let actor = Actor::system();
        let a = store.create_node(&acme(), &actor, NewNode::new(NodeType::Article, "A")).await.unwrap();

        let err = store
            .create_edge(&acme(), &actor, NewEdge::new(EdgeType::Cites, a.id, a.id))
            .await
            .unwrap_err();
        assert_eq!(err, GraphError::InvalidSelfLoop(EdgeType::Cites));

        assert!(store
            .create_edge(&acme(), &actor, NewEdge::new(EdgeType::Supersedes, a.id, a.id))
            .await
            .is_ok());

        let err = store
            .create_edge(&acme(), &actor, NewEdge::new(EdgeType::Supersedes, a.id, a.id).with_weight(-1.0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_update_patch_semantics() {
        let store = store();
        let actor = Actor::user("u-1");
        let node = store
            .create_node(
                &acme(),
                &actor,
                NewNode::new(NodeType::Keyword, "rust").with_property("searchVolume", 100).with_property("intent", "info"),
            )
            .await
            .unwrap();

        let updated = store
            .update_node(&acme(), &actor, node.id, NodePatch::default().set("searchVolume", 250).remove("intent"))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert!(updated.updated_at > node.updated_at);
        assert_eq!(updated.get_property("searchVolume").unwrap().as_integer(), Some(250));
        assert!(!updated.has_property("intent"));
        assert_eq!(updated.label, "rust");

        let unchanged = store
            .update_node(&acme(), &actor, node.id, NodePatch::default().set("searchVolume", 250))
            .await
            .unwrap();
        assert_eq!(unchanged.version, 2);

        let err = store
            .update_node(&acme(), &actor, node.id, NodePatch::default().label("x").expect_version(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::StaleWrite { expected: 1, actual: 2, .. }));

        let err = store
            .update_node(&acme(), &actor, node.id, NodePatch::default().set("clusterId", 4))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SCHEMA_VIOLATION");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store();
        let actor = Actor::system();
        let node = store.create_node(&acme(), &actor, NewNode::new(NodeType::Topic, "AI")).await.unwrap();

        assert!(store.delete_node(&acme(), &actor, node.id).await.unwrap());
        assert!(!store.delete_node(&acme(), &actor, node.id).await.unwrap());
        assert!(!store.delete_node(&acme(), &actor, NodeId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_edge_by_external_node_refs() {
        let store = store();
        let actor = Actor::ai("seo-pipeline");
        let upsert = |ext: &str, label: &str| NodeUpsert {
            node_type: NodeType::Keyword,
            external_source_id: ext.to_string(),
            label: label.to_string(),
            properties: PropertyMap::new(),
        };
        store.upsert_node(&acme(), &actor, upsert("kw:1", "rust")).await.unwrap();
        store.upsert_node(&acme(), &actor, upsert("kw:2", "tokio")).await.unwrap();

        let edge = EdgeUpsert {
            edge_type: EdgeType::RelatedTo,
            source: NodeRef::External { node_type: NodeType::Keyword, external_source_id: "kw:1".to_string() },
            target: NodeRef::External { node_type: NodeType::Keyword, external_source_id: "kw:2".to_string() },
            weight: Some(0.5),
            properties: PropertyMap::new(),
            external_source_id: None,
        };
        let (first, outcome) = store.upsert_edge(&acme(), &actor, edge.clone()).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        let (second, outcome) = store.upsert_edge(&acme(), &actor, edge.clone()).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(first.id, second.id);

        let mut heavier = edge;
        heavier.weight = Some(2.0);
        let (third, outcome) = store.upsert_edge(&acme(), &actor, heavier).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(third.weight, 2.0);
        assert_eq!(store.tenant_stats(&acme()).await.edge_count, 1);
    }
}
