//! Hop-count shortest paths
//!
//! Paths are found by breadth-first search, so they are shortest in hops,
//! not in weight. The reported `total_weight` is the sum of the weights
//! along the path that was found; a path with more hops may weigh less.

use crate::graph::{Direction, EdgeId, EdgeType, GraphError, GraphResult, NodeId, TenantGraph};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

/// A path from its first to its last node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub nodes: Vec<NodeId>,
    /// `edges[i]` joins `nodes[i]` and `nodes[i + 1]`
    pub edges: Vec<EdgeId>,
    pub total_weight: f64,
}

impl Path {
    pub fn hops(&self) -> usize {
        self.edges.len()
    }

    pub fn start(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    pub fn end(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }
}

#[derive(Debug, Clone)]
pub struct PathOptions {
    pub max_depth: usize,
    pub direction: Direction,
    pub edge_types: Option<Vec<EdgeType>>,
}

impl PathOptions {
    pub fn new(max_depth: usize) -> Self {
        PathOptions {
            max_depth,
            direction: Direction::Outbound,
            edge_types: None,
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn edge_types(mut self, edge_types: Vec<EdgeType>) -> Self {
        self.edge_types = Some(edge_types);
        self
    }
}

/// Breadth-first search from `from` to `to`. Among paths with the fewest
/// hops the first one found in edge insertion order wins.
pub(crate) fn shortest_hop_path(
    graph: &TenantGraph,
    from: NodeId,
    to: NodeId,
    options: &PathOptions,
    cancel: &CancellationToken,
) -> GraphResult<Option<Path>> {
    if from == to {
        return Ok(Some(Path {
            nodes: vec![from],
            edges: Vec::new(),
            total_weight: 0.0,
        }));
    }

    // node -> (parent, edge used to reach it, weight of that edge)
    let mut parents: FxHashMap<NodeId, Option<(NodeId, EdgeId, f64)>> = FxHashMap::default();
    let mut queue = VecDeque::new();
    parents.insert(from, None);
    queue.push_back((from, 0usize));

    let filter = options.edge_types.as_deref();
    while let Some((current, depth)) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        if depth >= options.max_depth {
            continue;
        }

        for edge in graph.neighbors(current, options.direction, filter) {
            let next = edge.other_end(current);
            if parents.contains_key(&next) {
                continue;
            }
            parents.insert(next, Some((current, edge.id, edge.weight)));
            if next == to {
                return Ok(Some(reconstruct(&parents, to)));
            }
            queue.push_back((next, depth + 1));
        }
    }

    Ok(None)
}

fn reconstruct(parents: &FxHashMap<NodeId, Option<(NodeId, EdgeId, f64)>>, to: NodeId) -> Path {
    let mut nodes = vec![to];
    let mut edges = Vec::new();
    let mut total_weight = 0.0;
    let mut current = to;
    while let Some(Some((parent, edge, weight))) = parents.get(&current) {
        nodes.push(*parent);
        edges.push(*edge);
        total_weight += weight;
        current = *parent;
    }
    nodes.reverse();
    edges.reverse();
    Path {
        nodes,
        edges,
        total_weight,
    }
}
