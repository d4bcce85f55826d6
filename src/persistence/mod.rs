//! Persistence layer
//!
//! Every graph mutation becomes one [`WriteBatch`] holding the entity writes
//! and the audit entries that describe them. A backend applies a batch
//! atomically or not at all.

pub mod journal;
pub mod storage;

pub use journal::Journal;
pub use storage::RocksBackend;

use crate::audit::AuditLogEntry;
use crate::graph::{
    EdgeId, EmbeddingRecord, EmbeddingTarget, IntelligenceEdge, IntelligenceNode, NodeId, SnapshotId,
    TenantId,
};
use crate::snapshot::GraphSnapshot;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Column family error: {0}")]
    ColumnFamily(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A single write inside a batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    PutNode(IntelligenceNode),
    DeleteNode(NodeId),
    PutEdge(IntelligenceEdge),
    DeleteEdge(EdgeId),
    PutEmbedding(EmbeddingRecord),
    DeleteEmbedding(EmbeddingTarget),
    PutSnapshot(Arc<GraphSnapshot>),
    DeleteSnapshot(SnapshotId),
    AppendAudit(AuditLogEntry),
}

/// Writes of one tenant applied as a unit
#[derive(Debug, Clone)]
pub struct WriteBatch {
    pub tenant: TenantId,
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new(tenant: TenantId) -> Self {
        WriteBatch { tenant, ops: Vec::new() }
    }

    pub fn put_node(&mut self, node: &IntelligenceNode) {
        self.ops.push(WriteOp::PutNode(node.clone()));
    }

    pub fn delete_node(&mut self, id: NodeId) {
        self.ops.push(WriteOp::DeleteNode(id));
        self.ops.push(WriteOp::DeleteEmbedding(EmbeddingTarget::Node(id)));
    }

    pub fn put_edge(&mut self, edge: &IntelligenceEdge) {
        self.ops.push(WriteOp::PutEdge(edge.clone()));
    }

    pub fn delete_edge(&mut self, id: EdgeId) {
        self.ops.push(WriteOp::DeleteEdge(id));
        self.ops.push(WriteOp::DeleteEmbedding(EmbeddingTarget::Edge(id)));
    }

    pub fn put_embedding(&mut self, record: &EmbeddingRecord) {
        self.ops.push(WriteOp::PutEmbedding(record.clone()));
    }

    pub fn put_snapshot(&mut self, snapshot: Arc<GraphSnapshot>) {
        self.ops.push(WriteOp::PutSnapshot(snapshot));
    }

    pub fn delete_snapshot(&mut self, id: SnapshotId) {
        self.ops.push(WriteOp::DeleteSnapshot(id));
    }

    pub fn append_audit(&mut self, entry: AuditLogEntry) {
        self.ops.push(WriteOp::AppendAudit(entry));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Everything persisted for one tenant, as loaded at startup
#[derive(Debug, Clone)]
pub struct TenantImage {
    pub tenant: TenantId,
    pub nodes: Vec<IntelligenceNode>,
    pub edges: Vec<IntelligenceEdge>,
    pub embeddings: Vec<EmbeddingRecord>,
    pub snapshots: Vec<GraphSnapshot>,
    /// Audit entries in sequence order
    pub audit: Vec<AuditLogEntry>,
}

impl TenantImage {
    pub fn empty(tenant: TenantId) -> Self {
        TenantImage {
            tenant,
            nodes: Vec::new(),
            edges: Vec::new(),
            embeddings: Vec::new(),
            snapshots: Vec::new(),
            audit: Vec::new(),
        }
    }
}

/// Durable store for graph records. Implementations must apply a batch
/// atomically: after an error none of its writes are visible.
pub trait StorageBackend: Send + Sync {
    fn commit(&self, batch: &WriteBatch) -> StorageResult<()>;

    fn load_all(&self) -> StorageResult<Vec<TenantImage>>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Default)]
struct MemoryTenant {
    nodes: IndexMap<NodeId, IntelligenceNode>,
    edges: IndexMap<EdgeId, IntelligenceEdge>,
    embeddings: IndexMap<EmbeddingTarget, EmbeddingRecord>,
    snapshots: IndexMap<SnapshotId, Arc<GraphSnapshot>>,
    audit: Vec<AuditLogEntry>,
}

/// Non-durable backend. Batches are applied under one lock so they stay atomic.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tenants: Mutex<BTreeMap<TenantId, MemoryTenant>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn commit(&self, batch: &WriteBatch) -> StorageResult<()> {
        let mut tenants = self
            .tenants
            .lock()
            .map_err(|_| StorageError::Unavailable("memory backend lock poisoned".to_string()))?;
        let tenant = tenants.entry(batch.tenant.clone()).or_default();

        for op in &batch.ops {
            match op {
                WriteOp::PutNode(node) => {
                    tenant.nodes.insert(node.id, node.clone());
                }
                WriteOp::DeleteNode(id) => {
                    tenant.nodes.shift_remove(id);
                }
                WriteOp::PutEdge(edge) => {
                    tenant.edges.insert(edge.id, edge.clone());
                }
                WriteOp::DeleteEdge(id) => {
                    tenant.edges.shift_remove(id);
                }
                WriteOp::PutEmbedding(record) => {
                    tenant.embeddings.insert(record.target, record.clone());
                }
                WriteOp::DeleteEmbedding(target) => {
                    tenant.embeddings.shift_remove(target);
                }
                WriteOp::PutSnapshot(snapshot) => {
                    tenant.snapshots.insert(snapshot.id, Arc::clone(snapshot));
                }
                WriteOp::DeleteSnapshot(id) => {
                    tenant.snapshots.shift_remove(id);
                }
                WriteOp::AppendAudit(entry) => tenant.audit.push(entry.clone()),
            }
        }
        Ok(())
    }

    fn load_all(&self) -> StorageResult<Vec<TenantImage>> {
        let tenants = self
            .tenants
            .lock()
            .map_err(|_| StorageError::Unavailable("memory backend lock poisoned".to_string()))?;
        Ok(tenants
            .iter()
            .map(|(id, t)| TenantImage {
                tenant: id.clone(),
                nodes: t.nodes.values().cloned().collect(),
                edges: t.edges.values().cloned().collect(),
                embeddings: t.embeddings.values().cloned().collect(),
                snapshots: t.snapshots.values().map(|s| s.as_ref().clone()).collect(),
                audit: t.audit.clone(),
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
