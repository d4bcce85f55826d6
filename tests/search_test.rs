use async_trait::async_trait;
use intelgraph::audit::Actor;
use intelgraph::graph::{EdgeType, EmbeddingTarget, NewEdge, NewNode, NodePatch, NodeType, TenantId};
use intelgraph::llm::{CollaboratorError, CollaboratorResult, Collaborators, Embedder, LLMProvider};
use intelgraph::persistence::MemoryBackend;
use intelgraph::search::{SearchEntity, SearchRequest, SearchScope};
use intelgraph::{EngineConfig, IntelligenceGraph};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Letter-frequency vectors; can be switched off to simulate an outage
#[derive(Default)]
struct SwitchableEmbedder {
    down: AtomicBool,
    slow: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for SwitchableEmbedder {
    fn provider(&self) -> LLMProvider {
        LLMProvider::Ollama
    }

    async fn embed(&self, text: &str) -> CollaboratorResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Api("503 service unavailable".to_string()));
        }
        if self.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        let mut v = vec![0.0f32; 26];
        for c in text.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
            v[(c - b'a') as usize] += 1.0;
        }
        Ok(v)
    }
}

fn engine_with(embedder: Arc<SwitchableEmbedder>) -> IntelligenceGraph {
    let config = EngineConfig {
        collaborator_timeout_ms: 200,
        ..EngineConfig::default()
    };
    let collaborators = Collaborators {
        embedder: Some(embedder),
        narrator: None,
    };
    IntelligenceGraph::open_with(config, Arc::new(MemoryBackend::new()), collaborators).unwrap()
}

fn ann_engine_with(embedder: Arc<SwitchableEmbedder>) -> IntelligenceGraph {
    let config = EngineConfig {
        exact_search_threshold: 1,
        ann_oversample: 1,
        ..EngineConfig::default()
    };
    let collaborators = Collaborators {
        embedder: Some(embedder),
        narrator: None,
    };
    IntelligenceGraph::open_with(config, Arc::new(MemoryBackend::new()), collaborators).unwrap()
}

fn node_label(entity: &SearchEntity) -> &str {
    match entity {
        SearchEntity::Node(node) => &node.label,
        SearchEntity::Edge(_) => "<edge>",
    }
}

#[tokio::test]
async fn test_search_ranks_by_similarity() {
    let embedder = Arc::new(SwitchableEmbedder::default());
    let engine = engine_with(embedder);
    let tenant = TenantId::new("acme");
    let actor = Actor::ai("content");
    for label in ["zzzz", "zzzy", "aaaa"] {
        engine
            .store()
            .create_node(&tenant, &actor, NewNode::new(NodeType::Topic, label))
            .await
            .unwrap();
    }

    let results = engine
        .search()
        .search(&tenant, &SearchRequest::new("topic: zzzz", 2).scope(SearchScope::Nodes))
        .await;
    assert!(!results.degraded);
    let labels: Vec<_> = results.hits.iter().map(|h| node_label(&h.entity)).collect();
    assert_eq!(labels, vec!["zzzz", "zzzy"]);
    assert!(results.hits[0].score >= results.hits[1].score);
    assert!(results.hits.iter().all(|h| !h.stale));

    // Another tenant sees nothing
    let other = engine.search().search(&TenantId::new("globex"), &SearchRequest::new("zzzz", 5)).await;
    assert!(other.hits.is_empty());
}

#[tokio::test]
async fn test_failed_refresh_marks_embedding_stale() {
    let embedder = Arc::new(SwitchableEmbedder::default());
    let engine = engine_with(Arc::clone(&embedder));
    let tenant = TenantId::new("acme");
    let actor = Actor::user("editor");
    let node = engine
        .store()
        .create_node(&tenant, &actor, NewNode::new(NodeType::Topic, "zzzz"))
        .await
        .unwrap();
    let first = engine.store().get_embedding(&tenant, EmbeddingTarget::Node(node.id)).await.unwrap();

    // The update commits even though the embedder is down
    embedder.down.store(true, Ordering::SeqCst);
    let updated = engine
        .store()
        .update_node(&tenant, &actor, node.id, NodePatch::default().label("zzzx"))
        .await
        .unwrap();
    assert_eq!(updated.label, "zzzx");
    let kept = engine.store().get_embedding(&tenant, EmbeddingTarget::Node(node.id)).await.unwrap();
    assert_eq!(kept.content_hash, first.content_hash);

    embedder.down.store(false, Ordering::SeqCst);
    let results = engine.search().search(&tenant, &SearchRequest::new("zzzz", 1)).await;
    assert_eq!(results.hits.len(), 1);
    assert!(results.hits[0].stale);

    let report = engine.store().reembed_tenant(&tenant, &CancellationToken::new()).await.unwrap();
    assert_eq!(report.refreshed, 1);
    assert!(!report.cancelled);
    let results = engine.search().search(&tenant, &SearchRequest::new("zzzz", 1)).await;
    assert!(!results.hits[0].stale);
}

#[tokio::test]
async fn test_slow_embedder_times_out() {
    let embedder = Arc::new(SwitchableEmbedder::default());
    let engine = engine_with(Arc::clone(&embedder));
    let tenant = TenantId::new("acme");

    embedder.slow.store(true, Ordering::SeqCst);
    let node = engine
        .store()
        .create_node(&tenant, &Actor::system(), NewNode::new(NodeType::Topic, "slow"))
        .await
        .unwrap();
    assert!(engine.store().get_embedding(&tenant, EmbeddingTarget::Node(node.id)).await.is_none());

    let results = engine.search().search(&tenant, &SearchRequest::new("slow", 3)).await;
    assert!(results.degraded);
    assert!(results.hits.is_empty());
}

#[tokio::test]
async fn test_search_without_embedder_is_degraded() {
    let engine = IntelligenceGraph::open(EngineConfig::default()).unwrap();
    let tenant = TenantId::new("acme");
    engine
        .store()
        .create_node(&tenant, &Actor::system(), NewNode::new(NodeType::Topic, "anything"))
        .await
        .unwrap();
    let results = engine.search().search(&tenant, &SearchRequest::new("anything", 3)).await;
    assert!(results.degraded);
    assert!(results.hits.is_empty());
}

#[tokio::test]
async fn test_similar_to_excludes_self() {
    let embedder = Arc::new(SwitchableEmbedder::default());
    let engine = engine_with(embedder);
    let tenant = TenantId::new("acme");
    let actor = Actor::system();
    let zz = engine
        .store()
        .create_node(&tenant, &actor, NewNode::new(NodeType::Keyword, "zzzz"))
        .await
        .unwrap();
    engine
        .store()
        .create_node(&tenant, &actor, NewNode::new(NodeType::Keyword, "zzzy"))
        .await
        .unwrap();

    let results = engine.search().similar_to(&tenant, zz.id, 5, SearchScope::Nodes).await.unwrap();
    assert_eq!(results.hits.len(), 1);
    assert_eq!(node_label(&results.hits[0].entity), "zzzy");

    let err = engine
        .search()
        .similar_to(&tenant, intelgraph::NodeId::new(), 5, SearchScope::Nodes)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_cancelled_reembed_keeps_progress() {
    let embedder = Arc::new(SwitchableEmbedder::default());
    embedder.down.store(true, Ordering::SeqCst);
    let engine = engine_with(Arc::clone(&embedder));
    let tenant = TenantId::new("acme");
    for i in 0..4 {
        engine
            .store()
            .create_node(&tenant, &Actor::system(), NewNode::new(NodeType::Topic, format!("t{}", i)))
            .await
            .unwrap();
    }
    embedder.down.store(false, Ordering::SeqCst);

    let token = CancellationToken::new();
    token.cancel();
    let report = engine.store().reembed_tenant(&tenant, &token).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.refreshed, 0);

    let report = engine.store().reembed_tenant(&tenant, &CancellationToken::new()).await.unwrap();
    assert_eq!(report.refreshed, 4);
    assert_eq!(engine.store().tenant_stats(&tenant).await.embedding_count, 4);
}

#[tokio::test]
async fn test_equal_scores_rank_recently_updated_first() {
    let engine = engine_with(Arc::new(SwitchableEmbedder::default()));
    let tenant = TenantId::new("acme");
    let actor = Actor::user("editor");
    // Same letters, so identical embeddings
    let older = engine
        .store()
        .create_node(&tenant, &actor, NewNode::new(NodeType::Topic, "ab"))
        .await
        .unwrap();
    let newer = engine
        .store()
        .create_node(&tenant, &actor, NewNode::new(NodeType::Topic, "ba"))
        .await
        .unwrap();

    let request = SearchRequest::new("topic: ab", 2).scope(SearchScope::Nodes);
    let ids = |hits: &[intelgraph::search::SearchHit]| -> Vec<_> {
        hits.iter()
            .map(|h| match &h.entity {
                SearchEntity::Node(n) => n.id,
                SearchEntity::Edge(_) => panic!("edge hit"),
            })
            .collect()
    };
    let results = engine.search().search(&tenant, &request).await;
    assert_eq!(results.hits[0].score, results.hits[1].score);
    assert_eq!(ids(&results.hits), vec![newer.id, older.id]);

    // Rewriting the label with the same letters keeps the vector but bumps updatedAt
    engine
        .store()
        .update_node(&tenant, &actor, older.id, NodePatch::default().label("ba"))
        .await
        .unwrap();
    let results = engine.search().search(&tenant, &request).await;
    assert_eq!(results.hits[0].score, results.hits[1].score);
    assert_eq!(ids(&results.hits), vec![older.id, newer.id]);
}

#[tokio::test]
async fn test_indexed_search_fills_scope_when_other_kinds_dominate() {
    let engine = ann_engine_with(Arc::new(SwitchableEmbedder::default()));
    let tenant = TenantId::new("acme");
    let actor = Actor::ai("seo");
    let store = engine.store();
    let x = store.create_node(&tenant, &actor, NewNode::new(NodeType::Topic, "x")).await.unwrap();
    let y = store.create_node(&tenant, &actor, NewNode::new(NodeType::Topic, "y")).await.unwrap();
    for _ in 0..12 {
        store
            .create_edge(&tenant, &actor, NewEdge::new(EdgeType::RelatedTo, x.id, y.id))
            .await
            .unwrap();
    }
    assert_eq!(store.tenant_stats(&tenant).await.embedding_count, 14);

    // The query sits next to the edges, so they fill any short candidate list
    let request = SearchRequest::new("x related_to y", 2);
    let all = engine.search().search(&tenant, &request).await;
    assert!(all.hits.iter().all(|h| matches!(h.entity, SearchEntity::Edge(_))));

    let nodes = engine.search().search(&tenant, &request.clone().scope(SearchScope::Nodes)).await;
    assert_eq!(nodes.hits.len(), 2);
    assert!(nodes.hits.iter().all(|h| matches!(h.entity, SearchEntity::Node(_))));

    let similar = engine.search().similar_to(&tenant, x.id, 5, SearchScope::Nodes).await.unwrap();
    assert_eq!(similar.hits.len(), 1);
    assert_eq!(node_label(&similar.hits[0].entity), "y");
}
