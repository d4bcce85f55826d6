//! Intelligence edge
//!
//! A directed, typed, weighted relationship between two nodes of the same tenant.

use super::node::next_timestamp;
use super::property::{PropertyMap, PropertyValue};
use super::types::{EdgeId, EdgeType, NodeId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default edge weight used by path weight accumulation
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// A directed edge in the intelligence graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceEdge {
    pub id: EdgeId,

    pub tenant_id: TenantId,

    pub edge_type: EdgeType,

    /// Source node (edge goes FROM this node)
    pub source: NodeId,

    /// Target node (edge goes TO this node)
    pub target: NodeId,

    /// Non-negative weight
    pub weight: f64,

    pub properties: PropertyMap,

    /// Upstream record this edge was ingested from. Unique per (tenant, edge_type).
    pub external_source_id: Option<String>,

    pub version: u64,

    /// Tenant-local insertion sequence; defines traversal order among siblings
    pub seq: u64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl IntelligenceEdge {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: EdgeId,
        tenant_id: TenantId,
        edge_type: EdgeType,
        source: NodeId,
        target: NodeId,
        weight: f64,
        properties: PropertyMap,
        external_source_id: Option<String>,
        seq: u64,
    ) -> Self {
        let now = Utc::now();
        IntelligenceEdge {
            id,
            tenant_id,
            edge_type,
            source,
            target,
            weight,
            properties,
            external_source_id,
            version: 1,
            seq,
            created_at: now,
            updated_at: now,
        }
    }

    /// Get a property value
    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Check if this edge touches a node at either end
    pub fn is_incident_to(&self, node: NodeId) -> bool {
        self.source == node || self.target == node
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    /// The endpoint opposite `node`. For a self-loop this is `node` itself.
    pub fn other_end(&self, node: NodeId) -> NodeId {
        if self.source == node {
            self.target
        } else {
            self.source
        }
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
        self.updated_at = next_timestamp(self.updated_at);
    }
}

impl PartialEq for IntelligenceEdge {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for IntelligenceEdge {}

impl std::hash::Hash for IntelligenceEdge {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Weights must be finite and non-negative.
pub fn is_valid_weight(weight: f64) -> bool {
    weight.is_finite() && weight >= 0.0
}
