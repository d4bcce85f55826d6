//! Intelligence node
//!
//! A node is a real-world or abstract entity (a journalist, a content asset,
//! a keyword cluster, an executive report, ...) owned by one tenant.

use super::property::{PropertyMap, PropertyValue};
use super::types::{NodeId, NodeType, TenantId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Upstream identity of a node: unique per tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalKey {
    pub node_type: NodeType,
    pub external_source_id: String,
}

/// A node in the intelligence graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceNode {
    /// Tenant-scoped identifier, immutable once created
    pub id: NodeId,

    pub tenant_id: TenantId,

    pub node_type: NodeType,

    /// Human-readable name
    pub label: String,

    /// Subsystem-specific attributes
    pub properties: PropertyMap,

    /// Upstream record this node was ingested from. Unique per (tenant, node_type).
    pub external_source_id: Option<String>,

    /// Optimistic-concurrency version, bumped on every structural mutation
    pub version: u64,

    /// Tenant-local insertion sequence
    pub seq: u64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// External keys of nodes merged into this one
    #[serde(default)]
    pub(crate) aliases: Vec<ExternalKey>,

    // Derived fields, written only by the analytics engine.
    pub(crate) centrality_score: Option<f64>,
    pub(crate) page_rank: Option<f64>,
    pub(crate) cluster_id: Option<u64>,
}

impl IntelligenceNode {
    pub(crate) fn new(
        id: NodeId,
        tenant_id: TenantId,
        node_type: NodeType,
        label: String,
        properties: PropertyMap,
        external_source_id: Option<String>,
        seq: u64,
    ) -> Self {
        let now = Utc::now();
        IntelligenceNode {
            id,
            tenant_id,
            node_type,
            label,
            properties,
            external_source_id,
            version: 1,
            seq,
            created_at: now,
            updated_at: now,
            aliases: Vec::new(),
            centrality_score: None,
            page_rank: None,
            cluster_id: None,
        }
    }

    /// Get a property value
    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Check if property exists
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// External key this node was ingested under, if any
    pub fn external_key(&self) -> Option<ExternalKey> {
        self.external_source_id.as_ref().map(|ext| ExternalKey {
            node_type: self.node_type,
            external_source_id: ext.clone(),
        })
    }

    /// External keys inherited from merged duplicates
    pub fn aliases(&self) -> &[ExternalKey] {
        &self.aliases
    }

    /// Normalized degree centrality from the last analytics run
    pub fn centrality_score(&self) -> Option<f64> {
        self.centrality_score
    }

    /// PageRank-style score from the last analytics run
    pub fn page_rank(&self) -> Option<f64> {
        self.page_rank
    }

    /// Connected-component label from the last analytics run
    pub fn cluster_id(&self) -> Option<u64> {
        self.cluster_id
    }

    /// Record a structural mutation: bump the version and move `updated_at`
    /// strictly forward.
    pub(crate) fn touch(&mut self) {
        self.version += 1;
        self.updated_at = next_timestamp(self.updated_at);
    }
}

impl PartialEq for IntelligenceNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for IntelligenceNode {}

impl std::hash::Hash for IntelligenceNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// `max(now, previous + 1µs)`: last-write-wins needs `updated_at` to be
/// strictly increasing even when the wall clock is coarse or steps back.
pub(crate) fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous + Duration::microseconds(1);
    let now = Utc::now();
    if now > floor {
        now
    } else {
        floor
    }
}
