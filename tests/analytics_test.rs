use intelgraph::audit::Actor;
use intelgraph::graph::{EdgeType, NewEdge, NewNode, NodeId, NodeType, TenantId};
use intelgraph::{EngineConfig, IntelligenceGraph};

async fn chain(engine: &IntelligenceGraph, tenant: &TenantId, labels: &[&str]) -> Vec<NodeId> {
    let actor = Actor::system();
    let mut ids = Vec::new();
    for label in labels {
        let node = engine
            .store()
            .create_node(tenant, &actor, NewNode::new(NodeType::Keyword, *label))
            .await
            .unwrap();
        ids.push(node.id);
    }
    for pair in ids.windows(2) {
        engine
            .store()
            .create_edge(tenant, &actor, NewEdge::new(EdgeType::RelatedTo, pair[0], pair[1]))
            .await
            .unwrap();
    }
    ids
}

#[tokio::test]
async fn test_middle_of_path_is_most_central() {
    let engine = IntelligenceGraph::open(EngineConfig::default()).unwrap();
    let tenant = TenantId::new("acme");
    let ids = chain(&engine, &tenant, &["A", "B", "C"]).await;

    let scores = engine.analytics().compute_centrality(&tenant).await.unwrap();
    assert_eq!(scores.len(), 3);
    let b = &scores[&ids[1]];
    assert_eq!(b.degree, 2);
    for id in [ids[0], ids[2]] {
        assert!(b.degree_centrality > scores[&id].degree_centrality);
    }

    let stored = engine.store().get_node(&tenant, ids[1]).await.unwrap();
    assert_eq!(stored.centrality_score(), Some(b.degree_centrality));
    assert!(stored.page_rank().is_some());
}

#[tokio::test]
async fn test_derived_fields_skip_version_and_audit() {
    let engine = IntelligenceGraph::open(EngineConfig::default()).unwrap();
    let tenant = TenantId::new("acme");
    let ids = chain(&engine, &tenant, &["A", "B"]).await;
    let before = engine.store().get_node(&tenant, ids[0]).await.unwrap();
    let audit_before = engine.audit().entries(&tenant).await.len();

    let report = engine.analytics().recompute(&tenant).await.unwrap();
    assert_eq!(report.updated_nodes, 2);

    let after = engine.store().get_node(&tenant, ids[0]).await.unwrap();
    assert_eq!(after.version, before.version);
    assert!(after.cluster_id().is_some());
    assert_eq!(engine.audit().entries(&tenant).await.len(), audit_before);

    // Unchanged scores are not written again
    let report = engine.analytics().recompute(&tenant).await.unwrap();
    assert_eq!(report.updated_nodes, 0);
}

#[tokio::test]
async fn test_clusters_follow_weak_connectivity() {
    let engine = IntelligenceGraph::open(EngineConfig::default()).unwrap();
    let tenant = TenantId::new("acme");
    let left = chain(&engine, &tenant, &["a1", "a2", "a3"]).await;
    let right = chain(&engine, &tenant, &["b1", "b2"]).await;
    let lonely = chain(&engine, &tenant, &["c"]).await;

    let clusters = engine.analytics().detect_clusters(&tenant).await.unwrap();
    assert_eq!(clusters.len(), 3);

    let cluster_of = |id: NodeId| clusters.iter().find(|c| c.members.contains(&id)).map(|c| c.id);
    assert_eq!(cluster_of(left[0]), cluster_of(left[2]));
    assert_eq!(cluster_of(right[0]), cluster_of(right[1]));
    assert_ne!(cluster_of(left[0]), cluster_of(right[0]));
    assert_ne!(cluster_of(lonely[0]), cluster_of(right[0]));

    let stored = engine.store().get_node(&tenant, right[1]).await.unwrap();
    assert_eq!(stored.cluster_id(), cluster_of(right[1]));
}

#[tokio::test]
async fn test_empty_tenant() {
    let engine = IntelligenceGraph::open(EngineConfig::default()).unwrap();
    let report = engine.analytics().recompute(&TenantId::new("nobody")).await.unwrap();
    assert!(report.centrality.is_empty());
    assert!(report.clusters.is_empty());
}
