//! Point-in-time snapshots and diffs
//!
//! A snapshot is an immutable copy of every node and edge of a tenant taken
//! under one consistent read of the partition. Snapshots can be deleted
//! (explicitly or by retention) but never edited.

pub mod diff;

pub use diff::{diff_snapshots, EdgeModification, GraphDiff, NodeModification, PropertyChange};

use crate::audit::{Actor, AuditDraft, AuditEventType, TargetKind};
use crate::graph::embedding::hex_digest;
use crate::graph::{
    EntityKind, GraphError, GraphResult, GraphStore, IntelligenceEdge, IntelligenceNode, SnapshotId, TenantId,
    TenantStats,
};
use crate::persistence::{Journal, StorageError, WriteBatch};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub id: SnapshotId,
    pub tenant_id: TenantId,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub nodes: Vec<IntelligenceNode>,
    pub edges: Vec<IntelligenceEdge>,
    pub stats: TenantStats,
    /// SHA-256 of the serialized node and edge payload
    pub checksum: String,
}

impl GraphSnapshot {
    fn payload_checksum(nodes: &[IntelligenceNode], edges: &[IntelligenceEdge]) -> Result<String, StorageError> {
        let bytes = bincode::serialize(&(nodes, edges))?;
        Ok(hex_digest(Sha256::digest(&bytes).as_slice()))
    }

    /// Recompute the payload checksum
    pub fn verify(&self) -> bool {
        matches!(Self::payload_checksum(&self.nodes, &self.edges), Ok(sum) if sum == self.checksum)
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            id: self.id,
            label: self.label.clone(),
            created_at: self.created_at,
            stats: self.stats.clone(),
            checksum: self.checksum.clone(),
        }
    }
}

/// Snapshot metadata without the payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub stats: TenantStats,
    pub checksum: String,
}

pub struct SnapshotManager {
    store: Arc<GraphStore>,
    journal: Arc<Journal>,
    /// Snapshots per tenant, oldest first
    snapshots: RwLock<HashMap<TenantId, IndexMap<SnapshotId, Arc<GraphSnapshot>>>>,
    retention: Option<usize>,
}

impl SnapshotManager {
    pub fn new(store: Arc<GraphStore>, journal: Arc<Journal>, retention: Option<usize>) -> Self {
        SnapshotManager {
            store,
            journal,
            snapshots: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Load persisted snapshots. Entries failing their checksum are skipped.
    pub fn restore(&mut self, mut snapshots: Vec<GraphSnapshot>) {
        snapshots.sort_by_key(|s| s.created_at);
        let by_tenant = self.snapshots.get_mut();
        for snapshot in snapshots {
            if !snapshot.verify() {
                warn!(tenant = %snapshot.tenant_id, snapshot_id = %snapshot.id, "Skipping snapshot with bad checksum");
                continue;
            }
            by_tenant
                .entry(snapshot.tenant_id.clone())
                .or_default()
                .insert(snapshot.id, Arc::new(snapshot));
        }
    }

    /// Capture the tenant graph. An empty tenant yields an empty snapshot.
    pub async fn create(&self, tenant: &TenantId, actor: &Actor, label: Option<String>) -> GraphResult<Arc<GraphSnapshot>> {
        let capture = self.store.capture(tenant).await;
        let checksum = GraphSnapshot::payload_checksum(&capture.nodes, &capture.edges)?;
        let snapshot = Arc::new(GraphSnapshot {
            id: SnapshotId::new(),
            tenant_id: tenant.clone(),
            label,
            created_at: Utc::now(),
            nodes: capture.nodes,
            edges: capture.edges,
            stats: capture.stats,
            checksum,
        });

        let mut all = self.snapshots.write().await;
        let existing = all.get(tenant);
        let evicted: Vec<Arc<GraphSnapshot>> = match (self.retention, existing) {
            (Some(keep), Some(existing)) => {
                // Keep `keep` snapshots including the new one.
                let excess = (existing.len() + 1).saturating_sub(keep.max(1));
                existing.values().take(excess).cloned().collect()
            }
            _ => Vec::new(),
        };

        let mut batch = WriteBatch::new(tenant.clone());
        batch.put_snapshot(Arc::clone(&snapshot));
        let mut drafts = vec![AuditDraft::new(AuditEventType::Snapshotted, actor, TargetKind::Snapshot, snapshot.id)
            .new_state(&snapshot.summary())];
        for old in &evicted {
            batch.delete_snapshot(old.id);
            drafts.push(
                AuditDraft::new(AuditEventType::Deleted, &Actor::system(), TargetKind::Snapshot, old.id)
                    .previous(&old.summary()),
            );
        }
        self.journal.commit(batch, drafts).await?;

        let tenant_snapshots = all.entry(tenant.clone()).or_default();
        for old in &evicted {
            tenant_snapshots.shift_remove(&old.id);
        }
        tenant_snapshots.insert(snapshot.id, Arc::clone(&snapshot));

        info!(
            tenant = %tenant,
            snapshot_id = %snapshot.id,
            nodes = snapshot.stats.node_count,
            edges = snapshot.stats.edge_count,
            evicted = evicted.len(),
            "Created snapshot"
        );
        Ok(snapshot)
    }

    pub async fn get(&self, tenant: &TenantId, id: SnapshotId) -> GraphResult<Arc<GraphSnapshot>> {
        self.snapshots
            .read()
            .await
            .get(tenant)
            .and_then(|s| s.get(&id))
            .cloned()
            .ok_or(GraphError::NotFound {
                kind: EntityKind::Snapshot,
                id: id.0,
            })
    }

    /// Summaries, oldest first
    pub async fn list(&self, tenant: &TenantId) -> Vec<SnapshotSummary> {
        self.snapshots
            .read()
            .await
            .get(tenant)
            .map(|s| s.values().map(|snap| snap.summary()).collect())
            .unwrap_or_default()
    }

    /// Delete a snapshot. Returns `false` when it did not exist.
    pub async fn delete(&self, tenant: &TenantId, actor: &Actor, id: SnapshotId) -> GraphResult<bool> {
        let mut all = self.snapshots.write().await;
        let Some(snapshot) = all.get(tenant).and_then(|s| s.get(&id)).cloned() else {
            return Ok(false);
        };

        let mut batch = WriteBatch::new(tenant.clone());
        batch.delete_snapshot(id);
        let draft = AuditDraft::new(AuditEventType::Deleted, actor, TargetKind::Snapshot, id).previous(&snapshot.summary());
        self.journal.commit(batch, vec![draft]).await?;

        if let Some(tenant_snapshots) = all.get_mut(tenant) {
            tenant_snapshots.shift_remove(&id);
        }
        info!(tenant = %tenant, snapshot_id = %id, "Deleted snapshot");
        Ok(true)
    }

    /// Diff from snapshot `from` to snapshot `to`
    pub async fn diff(&self, tenant: &TenantId, from: SnapshotId, to: SnapshotId) -> GraphResult<GraphDiff> {
        let from = self.get(tenant, from).await?;
        let to = self.get(tenant, to).await?;
        Ok(diff_snapshots(&from, &to))
    }
}
