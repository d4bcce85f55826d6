use intelgraph::audit::Actor;
use intelgraph::graph::{
    Direction, EdgeType, NewEdge, NewNode, NodePatch, NodeType, NodeUpsert, PropertyMap, TenantId, UpsertOutcome,
};
use intelgraph::traversal::TraversalRequest;
use intelgraph::{EngineConfig, IntelligenceGraph};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        data_path: Some(dir.path().join("graph")),
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn test_reopen_restores_graph_and_audit() {
    let dir = TempDir::new().unwrap();
    let acme = TenantId::new("acme");
    let globex = TenantId::new("globex");
    let actor = Actor::user("analyst");

    let (a, b, gone, snapshot_id) = {
        let engine = IntelligenceGraph::open(config(&dir)).unwrap();
        let store = engine.store();
        let a = store
            .create_node(&acme, &actor, NewNode::new(NodeType::Person, "Ada").with_external_source("crm:1"))
            .await
            .unwrap();
        let b = store.create_node(&acme, &actor, NewNode::new(NodeType::Article, "Engines")).await.unwrap();
        let gone = store.create_node(&acme, &actor, NewNode::new(NodeType::Topic, "temp")).await.unwrap();
        store.create_edge(&acme, &actor, NewEdge::new(EdgeType::AuthoredBy, a.id, b.id)).await.unwrap();
        store.create_edge(&acme, &actor, NewEdge::new(EdgeType::Mentions, b.id, gone.id)).await.unwrap();
        store
            .update_node(&acme, &actor, b.id, NodePatch::default().set("wordCount", 1200))
            .await
            .unwrap();
        store.delete_node(&acme, &actor, gone.id).await.unwrap();
        store.create_node(&globex, &actor, NewNode::new(NodeType::Topic, "theirs")).await.unwrap();
        engine.analytics().recompute(&acme).await.unwrap();
        let snapshot = engine.snapshots().create(&acme, &actor, Some("before restart".into())).await.unwrap();
        (a, b, gone, snapshot.id)
    };

    let engine = IntelligenceGraph::open(config(&dir)).unwrap();
    assert_eq!(engine.tenants().await, vec![acme.clone(), globex.clone()]);

    let stats = engine.store().tenant_stats(&acme).await;
    assert_eq!(stats.node_count, 2);
    assert_eq!(stats.edge_count, 1);
    assert!(engine.store().get_node(&acme, gone.id).await.is_err());

    let restored = engine.store().get_node(&acme, b.id).await.unwrap();
    assert_eq!(restored.version, 2);
    assert!(restored.centrality_score().is_some());

    let hits = engine
        .traversal()
        .traverse(&acme, &TraversalRequest::new(a.id, Direction::Outbound, 2), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);

    // 5 creates, 1 update, 1 delete, 1 snapshot
    assert_eq!(engine.audit().verify_chain(&acme).await.unwrap(), 8);
    assert_eq!(engine.audit().verify_chain(&globex).await.unwrap(), 1);

    let snapshot = engine.snapshots().get(&acme, snapshot_id).await.unwrap();
    assert!(snapshot.verify());
    assert_eq!(snapshot.nodes.len(), 2);

    // The external-key index survives the restart
    let (node, outcome) = engine
        .store()
        .upsert_node(
            &acme,
            &actor,
            NodeUpsert {
                node_type: NodeType::Person,
                external_source_id: "crm:1".to_string(),
                label: "Ada Lovelace".to_string(),
                properties: PropertyMap::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(node.id, a.id);
    assert_eq!(outcome, UpsertOutcome::Updated);

    // Audit sequence keeps growing after the restart
    assert_eq!(engine.audit().verify_chain(&acme).await.unwrap(), 9);
}

#[tokio::test]
async fn test_merge_survives_restart() {
    let dir = TempDir::new().unwrap();
    let tenant = TenantId::new("acme");
    let actor = Actor::user("editor");

    let (primary, duplicate) = {
        let engine = IntelligenceGraph::open(config(&dir)).unwrap();
        let store = engine.store();
        let primary = store.create_node(&tenant, &actor, NewNode::new(NodeType::Journalist, "Jane")).await.unwrap();
        let duplicate = store
            .create_node(&tenant, &actor, NewNode::new(NodeType::Journalist, "J.").with_external_source("crm:9"))
            .await
            .unwrap();
        let outlet = store.create_node(&tenant, &actor, NewNode::new(NodeType::MediaOutlet, "Daily")).await.unwrap();
        store
            .create_edge(&tenant, &actor, NewEdge::new(EdgeType::WritesFor, duplicate.id, outlet.id))
            .await
            .unwrap();
        store.merge_nodes(&tenant, &actor, primary.id, &[duplicate.id]).await.unwrap();
        (primary, duplicate)
    };

    let engine = IntelligenceGraph::open(config(&dir)).unwrap();
    assert!(engine.store().get_node(&tenant, duplicate.id).await.is_err());
    let edges = engine.store().find_edges_by_node(&tenant, primary.id, Direction::Outbound).await;
    assert_eq!(edges.len(), 1);

    let found = engine
        .store()
        .find_node_by_external(&tenant, NodeType::Journalist, "crm:9")
        .await
        .unwrap();
    assert_eq!(found.id, primary.id);
}
