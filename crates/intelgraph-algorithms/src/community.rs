//! Connected-component labeling
//!
//! Weakly connected components over the undirected projection of the view.
//! This is a grouping placeholder, not modularity-based community detection;
//! a Louvain pass can replace it behind the same [`WccResult`] shape.

use super::common::GraphView;
use std::collections::HashMap;
use std::hash::Hash;

/// Result of WCC algorithm
#[derive(Debug, Clone)]
pub struct WccResult<Id> {
    /// Components in label order; `components[c]` lists the members of component `c`
    pub components: Vec<Vec<Id>>,
    /// Map of node -> component label
    pub node_component: HashMap<Id, usize>,
}

/// Union-Find data structure
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        UnionFind {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    /// Iterative find with path halving.
    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, i: usize, j: usize) {
        let root_i = self.find(i);
        let root_j = self.find(j);

        if root_i == root_j {
            return;
        }
        match self.rank[root_i].cmp(&self.rank[root_j]) {
            std::cmp::Ordering::Less => self.parent[root_i] = root_j,
            std::cmp::Ordering::Greater => self.parent[root_j] = root_i,
            std::cmp::Ordering::Equal => {
                self.parent[root_j] = root_i;
                self.rank[root_i] += 1;
            }
        }
    }
}

/// Weakly Connected Components (WCC)
///
/// Labels are assigned in order of each component's first member in
/// `index_to_node`, so the same view always yields the same labels.
pub fn weakly_connected_components<Id: Copy + Eq + Hash>(view: &GraphView<Id>) -> WccResult<Id> {
    let n = view.node_count;
    let mut uf = UnionFind::new(n);

    for u_idx in 0..n {
        for &v_idx in view.successors(u_idx) {
            uf.union(u_idx, v_idx);
        }
    }

    let mut root_label: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<Vec<Id>> = Vec::new();
    let mut node_component = HashMap::with_capacity(n);

    for i in 0..n {
        let root = uf.find(i);
        let label = *root_label.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        let node_id = view.index_to_node[i];
        components[label].push(node_id);
        node_component.insert(node_id, label);
    }

    WccResult {
        components,
        node_component,
    }
}
