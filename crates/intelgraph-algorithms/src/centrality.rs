//! Degree centrality

use super::common::GraphView;
use std::collections::HashMap;
use std::hash::Hash;

/// Raw and normalized degree of a single node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegreeCentrality {
    pub in_degree: usize,
    pub out_degree: usize,
    /// `(in + out) / max(in + out)` over the view; 0.0 when the view has no edges.
    pub normalized: f64,
}

impl DegreeCentrality {
    pub fn degree(&self) -> usize {
        self.in_degree + self.out_degree
    }
}

/// Degree centrality normalized by the maximum observed degree.
///
/// A self-loop contributes to both the in- and out-degree of its node.
pub fn degree_centrality<Id: Copy + Eq + Hash>(view: &GraphView<Id>) -> HashMap<Id, DegreeCentrality> {
    let n = view.node_count;
    let degrees: Vec<(usize, usize)> = (0..n)
        .map(|i| (view.in_degree(i), view.out_degree(i)))
        .collect();

    let max_degree = degrees.iter().map(|(i, o)| i + o).max().unwrap_or(0);

    degrees
        .into_iter()
        .enumerate()
        .map(|(idx, (in_degree, out_degree))| {
            let normalized = if max_degree == 0 {
                0.0
            } else {
                (in_degree + out_degree) as f64 / max_degree as f64
            };
            (
                view.index_to_node[idx],
                DegreeCentrality {
                    in_degree,
                    out_degree,
                    normalized,
                },
            )
        })
        .collect()
}
