//! Structural diff between two snapshots

use super::GraphSnapshot;
use crate::graph::{EdgeId, IntelligenceEdge, IntelligenceNode, NodeId, PropertyValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Change of a single property between two captures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub key: String,
    pub before: Option<PropertyValue>,
    pub after: Option<PropertyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeModification {
    pub id: NodeId,
    pub label_before: String,
    pub label_after: String,
    pub updated_at_before: DateTime<Utc>,
    pub updated_at_after: DateTime<Utc>,
    pub property_changes: Vec<PropertyChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeModification {
    pub id: EdgeId,
    pub weight_before: f64,
    pub weight_after: f64,
    pub property_changes: Vec<PropertyChange>,
}

/// Differences from snapshot `from` to snapshot `to`. Added and removed sets
/// are id set differences; modifications compare entities present in both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDiff {
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub modified_nodes: Vec<NodeModification>,
    pub added_edges: Vec<EdgeId>,
    pub removed_edges: Vec<EdgeId>,
    pub modified_edges: Vec<EdgeModification>,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.modified_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
            && self.modified_edges.is_empty()
    }
}

pub fn diff_snapshots(from: &GraphSnapshot, to: &GraphSnapshot) -> GraphDiff {
    let before: HashMap<NodeId, &IntelligenceNode> = from.nodes.iter().map(|n| (n.id, n)).collect();
    let after: HashMap<NodeId, &IntelligenceNode> = to.nodes.iter().map(|n| (n.id, n)).collect();

    let mut diff = GraphDiff::default();

    // Iterate in capture order so the output is deterministic.
    for node in &to.nodes {
        match before.get(&node.id) {
            None => diff.added_nodes.push(node.id),
            Some(old) => {
                let property_changes = property_changes(&old.properties, &node.properties);
                if !property_changes.is_empty() || old.updated_at != node.updated_at || old.label != node.label {
                    diff.modified_nodes.push(NodeModification {
                        id: node.id,
                        label_before: old.label.clone(),
                        label_after: node.label.clone(),
                        updated_at_before: old.updated_at,
                        updated_at_after: node.updated_at,
                        property_changes,
                    });
                }
            }
        }
    }
    diff.removed_nodes = from
        .nodes
        .iter()
        .filter(|n| !after.contains_key(&n.id))
        .map(|n| n.id)
        .collect();

    let before: HashMap<EdgeId, &IntelligenceEdge> = from.edges.iter().map(|e| (e.id, e)).collect();
    let after: HashMap<EdgeId, &IntelligenceEdge> = to.edges.iter().map(|e| (e.id, e)).collect();

    for edge in &to.edges {
        match before.get(&edge.id) {
            None => diff.added_edges.push(edge.id),
            Some(old) => {
                let property_changes = property_changes(&old.properties, &edge.properties);
                let moved = old.source != edge.source || old.target != edge.target;
                if !property_changes.is_empty() || old.weight != edge.weight || old.updated_at != edge.updated_at || moved {
                    diff.modified_edges.push(EdgeModification {
                        id: edge.id,
                        weight_before: old.weight,
                        weight_after: edge.weight,
                        property_changes,
                    });
                }
            }
        }
    }
    diff.removed_edges = from
        .edges
        .iter()
        .filter(|e| !after.contains_key(&e.id))
        .map(|e| e.id)
        .collect();

    diff
}

fn property_changes(
    before: &crate::graph::PropertyMap,
    after: &crate::graph::PropertyMap,
) -> Vec<PropertyChange> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter_map(|key| {
            let old = before.get(key);
            let new = after.get(key);
            (old != new).then(|| PropertyChange {
                key: key.clone(),
                before: old.cloned(),
                after: new.cloned(),
            })
        })
        .collect()
}
