//! Approximate nearest-neighbour index over embeddings, backed by HNSW
//!
//! hnsw_rs has no delete, so replaced or removed vectors leave tombstoned
//! slots behind. The owning partition rebuilds the index once tombstones
//! outnumber live entries.

use crate::graph::EmbeddingTarget;
use hnsw_rs::prelude::*;
use std::collections::HashMap;

const MAX_CONNECTIONS: usize = 16;
const MAX_ELEMENTS: usize = 100_000;
const MAX_LAYERS: usize = 16;
const EF_CONSTRUCTION: usize = 200;

/// Rebuilds are not worth it below this many tombstones.
const MIN_TOMBSTONES_FOR_REBUILD: usize = 64;

/// Cosine distance for hnsw_rs
#[derive(Clone, Copy, Debug, Default)]
pub struct CosineDistance;

impl Distance<f32> for CosineDistance {
    fn eval(&self, va: &[f32], vb: &[f32]) -> f32 {
        1.0 - crate::graph::cosine_similarity(va, vb)
    }
}

/// HNSW index mapping internal slots to embedding targets
pub struct VectorIndex {
    dimensions: usize,
    hnsw: Hnsw<'static, f32, CosineDistance>,
    slots: Vec<Option<EmbeddingTarget>>,
    by_target: HashMap<EmbeddingTarget, usize>,
    tombstones: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimensions", &self.dimensions)
            .field("live", &self.len())
            .field("tombstones", &self.tombstones)
            .finish()
    }
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        let hnsw = Hnsw::new(MAX_CONNECTIONS, MAX_ELEMENTS, MAX_LAYERS, EF_CONSTRUCTION, CosineDistance);
        Self {
            dimensions,
            hnsw,
            slots: Vec::new(),
            by_target: HashMap::new(),
            tombstones: 0,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of live vectors
    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    /// Insert or replace the vector of `target`. Vectors of a different
    /// dimensionality are ignored and `false` is returned.
    pub fn upsert(&mut self, target: EmbeddingTarget, vector: &Vec<f32>) -> bool {
        if vector.len() != self.dimensions {
            return false;
        }
        self.remove(target);
        let slot = self.slots.len();
        self.hnsw.insert((vector, slot));
        self.slots.push(Some(target));
        self.by_target.insert(target, slot);
        true
    }

    pub fn remove(&mut self, target: EmbeddingTarget) {
        if let Some(slot) = self.by_target.remove(&target) {
            self.slots[slot] = None;
            self.tombstones += 1;
        }
    }

    /// Slots of replaced or removed vectors still held by the HNSW graph
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    pub fn needs_rebuild(&self) -> bool {
        self.tombstones >= MIN_TOMBSTONES_FOR_REBUILD && self.tombstones > self.len()
    }

    /// Up to `k` live targets nearest to `query`, with cosine similarity.
    /// Tombstoned hits are skipped, so fewer than `k` may come back.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(EmbeddingTarget, f32)> {
        if query.len() != self.dimensions || k == 0 || self.is_empty() {
            return Vec::new();
        }
        // Ask for extra neighbours to make up for tombstoned slots.
        let fetch = (k + self.tombstones).min(self.slots.len());
        let ef_search = (fetch * 2).max(EF_CONSTRUCTION);
        self.hnsw
            .search(query, fetch, ef_search)
            .into_iter()
            .filter_map(|n| {
                let target = self.slots.get(n.d_id).copied().flatten()?;
                Some((target, 1.0 - n.distance))
            })
            .take(k)
            .collect()
    }
}
