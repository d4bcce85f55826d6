//! Semantic search over node and edge embeddings
//!
//! Small tenants are scanned exactly. Above `exact_search_threshold`
//! embeddings, the tenant's HNSW index proposes an oversampled candidate set
//! which is then re-scored exactly. Ranking is by cosine similarity, then by
//! most recently updated entity, then by insertion order.

pub mod index;

pub use index::VectorIndex;

use crate::graph::{
    cosine_similarity, content_hash, EmbeddingTarget, EntityKind, GraphError, GraphResult, GraphStore,
    IntelligenceEdge, IntelligenceNode, NodeId, TenantGraph, TenantId,
};
use crate::llm::with_timeout;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    Nodes,
    Edges,
    #[default]
    All,
}

impl SearchScope {
    fn admits(&self, target: &EmbeddingTarget) -> bool {
        matches!(
            (self, target),
            (SearchScope::All, _) | (SearchScope::Nodes, EmbeddingTarget::Node(_)) | (SearchScope::Edges, EmbeddingTarget::Edge(_))
        )
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub text: String,
    pub k: usize,
    /// Hits scoring below this are dropped
    pub min_similarity: f32,
    pub scope: SearchScope,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>, k: usize) -> Self {
        SearchRequest {
            text: text.into(),
            k,
            min_similarity: 0.0,
            scope: SearchScope::All,
        }
    }

    pub fn min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchEntity {
    Node(IntelligenceNode),
    Edge(IntelligenceEdge),
}

impl SearchEntity {
    fn updated_at(&self) -> DateTime<Utc> {
        match self {
            SearchEntity::Node(n) => n.updated_at,
            SearchEntity::Edge(e) => e.updated_at,
        }
    }

    fn seq(&self) -> u64 {
        match self {
            SearchEntity::Node(n) => n.seq,
            SearchEntity::Edge(e) => e.seq,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub entity: SearchEntity,
    pub score: f32,
    /// The embedding is past the staleness window or predates the entity's
    /// current content
    pub stale: bool,
    pub embedded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// The query could not be embedded; `hits` is empty
    pub degraded: bool,
}

pub struct SemanticSearch {
    store: Arc<GraphStore>,
    exact_search_threshold: usize,
    ann_oversample: usize,
}

impl SemanticSearch {
    pub fn new(store: Arc<GraphStore>, exact_search_threshold: usize, ann_oversample: usize) -> Self {
        SemanticSearch {
            store,
            exact_search_threshold,
            ann_oversample: ann_oversample.max(1),
        }
    }

    /// Embed `request.text` and rank stored embeddings against it. A missing
    /// or failing embedder yields an empty, degraded result.
    pub async fn search(&self, tenant: &TenantId, request: &SearchRequest) -> SearchResults {
        if request.k == 0 {
            return SearchResults::default();
        }
        let Some(embedder) = self.store.embedder() else {
            debug!(tenant = %tenant, "No embedder configured, search degraded");
            return SearchResults { hits: Vec::new(), degraded: true };
        };
        let query = match with_timeout(self.store.collaborator_timeout(), embedder.embed(&request.text)).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "Query embedding failed, search degraded");
                return SearchResults { hits: Vec::new(), degraded: true };
            }
        };

        let hits = self
            .rank(tenant, &query, request.k, request.min_similarity, request.scope, None)
            .await;
        debug!(tenant = %tenant, hits = hits.len(), "Search finished");
        SearchResults { hits, degraded: false }
    }

    /// Nodes and edges closest to the stored embedding of `node`. Does not
    /// call the collaborator.
    pub async fn similar_to(&self, tenant: &TenantId, node: NodeId, k: usize, scope: SearchScope) -> GraphResult<SearchResults> {
        let target = EmbeddingTarget::Node(node);
        let record = self.store.get_embedding(tenant, target).await.ok_or(GraphError::NotFound {
            kind: EntityKind::Embedding,
            id: node.0,
        })?;
        let hits = self.rank(tenant, &record.vector, k, 0.0, scope, Some(target)).await;
        Ok(SearchResults { hits, degraded: false })
    }

    async fn rank(
        &self,
        tenant: &TenantId,
        query: &[f32],
        k: usize,
        min_similarity: f32,
        scope: SearchScope,
        exclude: Option<EmbeddingTarget>,
    ) -> Vec<SearchHit> {
        if k == 0 {
            return Vec::new();
        }
        let Some(partition) = self.store.existing_partition(tenant).await else {
            return Vec::new();
        };
        let graph = partition.read().await;

        let admits = |target: EmbeddingTarget| scope.admits(&target) && Some(target) != exclude;
        let candidates = self.candidates(&graph, query, k, min_similarity, admits);
        let now = Utc::now();
        let window = self.store.embedding_staleness();

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter_map(|(target, score)| {
                let record = graph.embedding(target)?;
                let entity = match target {
                    EmbeddingTarget::Node(id) => SearchEntity::Node(graph.node(id)?.clone()),
                    EmbeddingTarget::Edge(id) => SearchEntity::Edge(graph.edge(id)?.clone()),
                };
                Some((record, entity, score))
            })
            .map(|(record, entity, score)| {
                let current = graph.canonical_text(record.target).map(|t| content_hash(&t));
                SearchHit {
                    stale: record.is_stale(now, window, current.as_deref()),
                    embedded_at: record.generated_at,
                    entity,
                    score,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.entity.updated_at().cmp(&a.entity.updated_at()))
                .then_with(|| a.entity.seq().cmp(&b.entity.seq()))
        });
        hits.truncate(k);
        hits
    }

    /// Admissible scored candidates: every embedding for small tenants, an
    /// ANN shortlist for large ones. The shortlist widens until it holds `k`
    /// admissible candidates; an index that cannot supply them falls back to
    /// the exact scan.
    fn candidates<F>(
        &self,
        graph: &TenantGraph,
        query: &[f32],
        k: usize,
        min_similarity: f32,
        admits: F,
    ) -> Vec<(EmbeddingTarget, f32)>
    where
        F: Fn(EmbeddingTarget) -> bool + Sync,
    {
        if graph.embedding_count() > self.exact_search_threshold {
            if let Some(ann) = graph.ann_index().filter(|ann| ann.dimensions() == query.len()) {
                let mut fetch = k.saturating_mul(self.ann_oversample);
                loop {
                    let shortlist: Vec<(EmbeddingTarget, f32)> = ann
                        .search(query, fetch)
                        .into_iter()
                        .filter_map(|(target, _)| {
                            let record = graph.embedding(target)?;
                            Some((target, cosine_similarity(query, &record.vector)))
                        })
                        .collect();
                    // Neighbours come nearest first, so nothing further out can pass the floor
                    let below_floor = shortlist.last().is_some_and(|(_, score)| *score < min_similarity);
                    let admissible: Vec<_> = shortlist
                        .into_iter()
                        .filter(|(target, score)| *score >= min_similarity && admits(*target))
                        .collect();
                    if admissible.len() >= k || below_floor {
                        return admissible;
                    }
                    if fetch >= ann.len() {
                        debug!(fetch, found = admissible.len(), "ANN shortlist exhausted, scanning exactly");
                        break;
                    }
                    fetch = fetch.saturating_mul(2).min(ann.len());
                }
            }
        }

        let records: Vec<_> = graph.embeddings().collect();
        records
            .par_iter()
            .map(|record| (record.target, cosine_similarity(query, &record.vector)))
            .filter(|(target, score)| *score >= min_similarity && admits(*target))
            .collect()
    }
}
