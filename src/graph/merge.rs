//! Merge planning
//!
//! A plan is computed against a read view of the partition and is applied
//! (or previewed) by the store. Nothing here mutates the graph.

use super::edge::IntelligenceEdge;
use super::node::IntelligenceNode;
use super::partition::TenantGraph;
use super::property::PropertyMap;
use super::types::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Read-only outcome of a merge, as reported by `preview_merge`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePreview {
    pub primary: NodeId,
    pub duplicates: Vec<NodeId>,
    /// Primary properties unioned with the duplicates', primary wins
    pub merged_properties: PropertyMap,
    /// Keys where a duplicate disagreed with the primary and lost
    pub conflicting_keys: Vec<String>,
    pub repointed_edges: Vec<EdgeId>,
    /// Edges that would collapse into a non-whitelisted self-loop
    pub dropped_edges: Vec<EdgeId>,
}

#[derive(Debug, Clone)]
pub(crate) struct MergePlan {
    /// Primary with merged properties and aliases; version not yet bumped
    pub primary: IntelligenceNode,
    pub duplicates: Vec<IntelligenceNode>,
    /// Incident edges of each duplicate before the merge
    pub duplicate_edges: HashMap<NodeId, Vec<IntelligenceEdge>>,
    /// Edges with their endpoints moved onto the primary
    pub repointed: Vec<IntelligenceEdge>,
    pub dropped: Vec<EdgeId>,
    pub conflicting_keys: Vec<String>,
}

impl MergePlan {
    pub fn preview(&self) -> MergePreview {
        MergePreview {
            primary: self.primary.id,
            duplicates: self.duplicates.iter().map(|n| n.id).collect(),
            merged_properties: self.primary.properties.clone(),
            conflicting_keys: self.conflicting_keys.clone(),
            repointed_edges: self.repointed.iter().map(|e| e.id).collect(),
            dropped_edges: self.dropped.clone(),
        }
    }
}

/// Plan merging `duplicates` into `primary`. All ids must exist in `graph`,
/// be distinct, and exclude the primary.
pub(crate) fn plan_merge(graph: &TenantGraph, primary: &IntelligenceNode, duplicates: &[NodeId]) -> MergePlan {
    let mut merged = primary.clone();
    let mut conflicting_keys = Vec::new();
    let mut dup_nodes = Vec::with_capacity(duplicates.len());
    let mut duplicate_edges = HashMap::new();
    let mut repointed = Vec::new();
    let mut dropped = Vec::new();
    let mut seen: HashSet<EdgeId> = HashSet::new();

    let absorbed: HashSet<NodeId> = duplicates.iter().copied().collect();
    let remap = |id: NodeId| if absorbed.contains(&id) { primary.id } else { id };

    for dup_id in duplicates {
        let Some(dup) = graph.node(*dup_id) else {
            continue;
        };

        for (key, value) in &dup.properties {
            match merged.properties.get(key) {
                None => {
                    merged.properties.insert(key.clone(), value.clone());
                }
                Some(existing) if existing != value && primary.properties.contains_key(key) => {
                    if !conflicting_keys.contains(key) {
                        conflicting_keys.push(key.clone());
                    }
                }
                Some(_) => {}
            }
        }

        if let Some(key) = dup.external_key() {
            merged.aliases.push(key);
        }
        merged.aliases.extend(dup.aliases.iter().cloned());

        let incident: Vec<IntelligenceEdge> = graph
            .incident_edges(*dup_id)
            .into_iter()
            .filter_map(|id| graph.edge(id).cloned())
            .collect();

        for edge in &incident {
            if !seen.insert(edge.id) {
                continue;
            }
            let source = remap(edge.source);
            let target = remap(edge.target);
            if source == target && !edge.edge_type.allows_self_loop() {
                dropped.push(edge.id);
                continue;
            }
            let mut moved = edge.clone();
            moved.source = source;
            moved.target = target;
            repointed.push(moved);
        }

        duplicate_edges.insert(*dup_id, incident);
        dup_nodes.push(dup.clone());
    }

    MergePlan {
        primary: merged,
        duplicates: dup_nodes,
        duplicate_edges,
        repointed,
        dropped,
        conflicting_keys,
    }
}
