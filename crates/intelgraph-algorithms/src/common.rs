//! Shared utilities for graph algorithms
//!
//! Provides a read-only, optimized view of the graph topology for algorithm execution.

use std::collections::HashMap;
use std::hash::Hash;

/// A dense, integer-indexed view of the graph topology using Compressed Sparse Row (CSR) format.
///
/// `Id` is whatever identifier the caller uses for nodes; algorithms only
/// ever touch dense indices and map back through `index_to_node`.
#[derive(Debug, Clone)]
pub struct GraphView<Id> {
    /// Number of nodes
    pub node_count: usize,
    /// Mapping from dense index (0..N) back to the caller's id
    pub index_to_node: Vec<Id>,
    /// Mapping from the caller's id to dense index
    pub node_to_index: HashMap<Id, usize>,

    /// Offsets into `out_targets`. Size = node_count + 1
    pub out_offsets: Vec<usize>,
    /// Contiguous array of target node indices
    pub out_targets: Vec<usize>,

    /// Offsets into `in_sources`. Size = node_count + 1
    pub in_offsets: Vec<usize>,
    /// Contiguous array of source node indices
    pub in_sources: Vec<usize>,
}

impl<Id: Copy + Eq + Hash> GraphView<Id> {
    /// Build a view from per-node outgoing adjacency lists.
    ///
    /// `outgoing[i]` holds the dense indices of the targets of node `i`, in
    /// the order edges should be visited. The incoming side is derived.
    pub fn from_adjacency_list(index_to_node: Vec<Id>, outgoing: Vec<Vec<usize>>) -> Self {
        let node_count = index_to_node.len();
        let node_to_index = index_to_node
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect();

        let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        for (u_idx, targets) in outgoing.iter().enumerate() {
            for &v_idx in targets {
                incoming[v_idx].push(u_idx);
            }
        }

        let mut out_offsets = Vec::with_capacity(node_count + 1);
        let mut out_targets = Vec::new();
        out_offsets.push(0);
        for neighbors in outgoing {
            out_targets.extend(neighbors);
            out_offsets.push(out_targets.len());
        }

        let mut in_offsets = Vec::with_capacity(node_count + 1);
        let mut in_sources = Vec::new();
        in_offsets.push(0);
        for sources in incoming {
            in_sources.extend(sources);
            in_offsets.push(in_sources.len());
        }

        GraphView {
            node_count,
            index_to_node,
            node_to_index,
            out_offsets,
            out_targets,
            in_offsets,
            in_sources,
        }
    }

    /// Get the out-degree of a node (by index)
    pub fn out_degree(&self, idx: usize) -> usize {
        self.out_offsets[idx + 1] - self.out_offsets[idx]
    }

    /// Get the in-degree of a node (by index)
    pub fn in_degree(&self, idx: usize) -> usize {
        self.in_offsets[idx + 1] - self.in_offsets[idx]
    }

    /// Get outgoing neighbors (successors) of a node
    pub fn successors(&self, idx: usize) -> &[usize] {
        &self.out_targets[self.out_offsets[idx]..self.out_offsets[idx + 1]]
    }

    /// Get incoming neighbors (predecessors) of a node
    pub fn predecessors(&self, idx: usize) -> &[usize] {
        &self.in_sources[self.in_offsets[idx]..self.in_offsets[idx + 1]]
    }

    /// Total number of directed edges in the view
    pub fn edge_count(&self) -> usize {
        self.out_targets.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 1 -> 2 -> 3, plus isolated 4
    pub(crate) fn chain() -> GraphView<u32> {
        GraphView::from_adjacency_list(vec![1, 2, 3, 4], vec![vec![1], vec![2], vec![], vec![]])
    }

    #[test]
    fn test_csr_projection() {
        let view = chain();
        assert_eq!(view.node_count, 4);
        assert_eq!(view.edge_count(), 2);
        assert_eq!(view.successors(0), &[1]);
        assert_eq!(view.predecessors(2), &[1]);
        assert_eq!(view.out_degree(2), 0);
        assert_eq!(view.in_degree(1), 1);
        assert_eq!(view.node_to_index[&3], 2);
    }
}
