//! Analytics engine
//!
//! Degree centrality, approximate PageRank and connected-component
//! clusters. Each run projects the tenant graph into a CSR view under one
//! read lock, computes without holding any lock, then replaces the derived
//! fields on every node that still exists. Runs are safe to repeat and to
//! overlap with mutations; the last writer of a node's derived fields wins.
//!
//! Clustering is plain weakly-connected-component labeling, not modularity
//! optimization. A community algorithm such as Louvain can replace it without
//! changing the cluster id and member list contract.

use crate::graph::{GraphResult, GraphStore, NodeId, TenantGraph, TenantId};
use intelgraph_algorithms::{degree_centrality, page_rank, weakly_connected_components, GraphView, PageRankConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub damping_factor: f64,
    pub iterations: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        AnalyticsConfig {
            damping_factor: 0.85,
            iterations: 20,
        }
    }
}

/// Scores of one node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeCentrality {
    /// In-degree plus out-degree
    pub degree: usize,
    /// `degree` divided by the largest degree in the tenant, in [0, 1]
    pub degree_centrality: f64,
    pub page_rank: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: u64,
    /// Members in node insertion order
    pub members: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub centrality: HashMap<NodeId, NodeCentrality>,
    pub clusters: Vec<Cluster>,
    /// Nodes whose derived fields were written
    pub updated_nodes: usize,
}

pub struct AnalyticsEngine {
    store: Arc<GraphStore>,
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    pub fn new(store: Arc<GraphStore>, config: AnalyticsConfig) -> Self {
        AnalyticsEngine { store, config }
    }

    async fn view(&self, tenant: &TenantId) -> Option<GraphView<NodeId>> {
        let partition = self.store.existing_partition(tenant).await?;
        let graph = partition.read().await;
        Some(project(&graph))
    }

    /// Compute and store degree centrality and PageRank for every node
    pub async fn compute_centrality(&self, tenant: &TenantId) -> GraphResult<HashMap<NodeId, NodeCentrality>> {
        let Some(view) = self.view(tenant).await else {
            return Ok(HashMap::new());
        };
        let scores = centrality(&view, &self.config);

        let derived = scores
            .iter()
            .map(|(id, c)| (*id, (c.degree_centrality, c.page_rank)))
            .collect();
        let updated = self.store.apply_centrality(tenant, &derived).await?;
        info!(tenant = %tenant, nodes = scores.len(), updated, "Computed centrality");
        Ok(scores)
    }

    /// Label connected components of the undirected projection and store
    /// each node's cluster id
    pub async fn detect_clusters(&self, tenant: &TenantId) -> GraphResult<Vec<Cluster>> {
        let Some(view) = self.view(tenant).await else {
            return Ok(Vec::new());
        };
        let clusters = clusters(&view);

        let assignment = clusters
            .iter()
            .flat_map(|c| c.members.iter().map(move |m| (*m, c.id)))
            .collect();
        let updated = self.store.apply_clusters(tenant, &assignment).await?;
        info!(tenant = %tenant, clusters = clusters.len(), updated, "Detected clusters");
        Ok(clusters)
    }

    /// Full recompute of both derived fields from one projection
    pub async fn recompute(&self, tenant: &TenantId) -> GraphResult<AnalyticsReport> {
        let Some(view) = self.view(tenant).await else {
            return Ok(AnalyticsReport::default());
        };
        let centrality = centrality(&view, &self.config);
        let clusters = clusters(&view);

        let scores = centrality
            .iter()
            .map(|(id, c)| (*id, (c.degree_centrality, c.page_rank)))
            .collect();
        let assignment = clusters
            .iter()
            .flat_map(|c| c.members.iter().map(move |m| (*m, c.id)))
            .collect();
        let updated = self.store.apply_centrality(tenant, &scores).await?;
        self.store.apply_clusters(tenant, &assignment).await?;

        info!(tenant = %tenant, nodes = centrality.len(), clusters = clusters.len(), "Recomputed analytics");
        Ok(AnalyticsReport {
            centrality,
            clusters,
            updated_nodes: updated,
        })
    }
}

/// Dense projection of a partition: node indices follow insertion order and
/// each adjacency list follows edge insertion order.
pub(crate) fn project(graph: &TenantGraph) -> GraphView<NodeId> {
    let index_to_node: Vec<NodeId> = graph.nodes().map(|n| n.id).collect();
    let index: HashMap<NodeId, usize> = index_to_node.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut outgoing = Vec::with_capacity(index_to_node.len());
    for id in &index_to_node {
        let edges = graph.neighbors(*id, crate::graph::Direction::Outbound, None);
        let mut targets = Vec::with_capacity(edges.len());
        for edge in edges {
            if let Some(target) = index.get(&edge.target) {
                targets.push(*target);
            }
        }
        outgoing.push(targets);
    }

    GraphView::from_adjacency_list(index_to_node, outgoing)
}

fn centrality(view: &GraphView<NodeId>, config: &AnalyticsConfig) -> HashMap<NodeId, NodeCentrality> {
    let degrees = degree_centrality(view);
    let ranks = page_rank(
        view,
        PageRankConfig {
            damping_factor: config.damping_factor,
            iterations: config.iterations,
            tolerance: 0.0,
        },
    );
    degrees
        .into_iter()
        .map(|(id, d)| {
            let rank = ranks.get(&id).copied().unwrap_or(0.0);
            (
                id,
                NodeCentrality {
                    degree: d.degree(),
                    degree_centrality: d.normalized,
                    page_rank: rank,
                },
            )
        })
        .collect()
}

fn clusters(view: &GraphView<NodeId>) -> Vec<Cluster> {
    weakly_connected_components(view)
        .components
        .into_iter()
        .enumerate()
        .map(|(label, members)| Cluster {
            id: label as u64,
            members,
        })
        .collect()
}
