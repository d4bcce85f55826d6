//! PageRank-style centrality
//!
//! Iterates `score(n) = (1 - d) + d * Σ score(m) / out_degree(m)` over the
//! incoming neighbors `m` of `n` for a bounded number of rounds. The bound is
//! the termination contract; convergence is not required.

use super::common::GraphView;
use rayon::prelude::*;
use std::collections::HashMap;
use std::hash::Hash;

/// PageRank configuration
#[derive(Debug, Clone, Copy)]
pub struct PageRankConfig {
    /// Damping factor (usually 0.85)
    pub damping_factor: f64,
    /// Number of iterations
    pub iterations: usize,
    /// Stop early once the total absolute change drops below this. 0.0 runs every iteration.
    pub tolerance: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping_factor: 0.85,
            iterations: 20,
            tolerance: 0.0,
        }
    }
}

/// Calculate PageRank for the graph view
pub fn page_rank<Id: Copy + Eq + Hash + Send + Sync>(
    view: &GraphView<Id>,
    config: PageRankConfig,
) -> HashMap<Id, f64> {
    let n = view.node_count;

    if n == 0 {
        return HashMap::new();
    }

    // Initial score is 1.0 for all nodes
    let mut scores = vec![1.0; n];
    let mut next_scores = vec![0.0; n];

    let d = config.damping_factor;
    let base_score = 1.0 - d;

    for _ in 0..config.iterations {
        next_scores.par_iter_mut().enumerate().for_each(|(i, next)| {
            let sum_incoming: f64 = view
                .predecessors(i)
                .iter()
                .map(|&source_idx| scores[source_idx] / view.out_degree(source_idx) as f64)
                .sum();
            *next = base_score + d * sum_incoming;
        });

        let total_diff: f64 = next_scores
            .iter()
            .zip(scores.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();

        std::mem::swap(&mut scores, &mut next_scores);

        if total_diff < config.tolerance {
            break;
        }
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(idx, score)| (view.index_to_node[idx], score))
        .collect()
}
