use intelgraph::audit::{Actor, AuditEventType};
use intelgraph::graph::{
    Direction, EdgePatch, EdgeType, EdgeUpsert, GraphError, NewEdge, NewNode, NodePatch, NodeQuery, NodeRef, NodeType,
    NodeUpsert, PropertyMap, PropertyValue, TenantId, UpsertOutcome,
};
use intelgraph::persistence::{MemoryBackend, StorageBackend, StorageError, StorageResult, TenantImage, WriteBatch};
use intelgraph::{EngineConfig, IntelligenceGraph};
use intelgraph::llm::Collaborators;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn engine() -> IntelligenceGraph {
    IntelligenceGraph::open(EngineConfig::default()).unwrap()
}

/// Memory backend that rejects commits while `failing` is set
struct FlakyBackend {
    inner: MemoryBackend,
    failing: AtomicBool,
}

impl StorageBackend for FlakyBackend {
    fn commit(&self, batch: &WriteBatch) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("disk on fire".to_string()));
        }
        self.inner.commit(batch)
    }

    fn load_all(&self) -> StorageResult<Vec<TenantImage>> {
        self.inner.load_all()
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

#[tokio::test]
async fn test_duplicate_external_source_rejected() {
    let engine = engine();
    let tenant = TenantId::new("acme");
    let actor = Actor::ai("pr-pipeline");
    let new = || NewNode::new(NodeType::Journalist, "Jane Doe").with_external_source("muckrack:42");

    engine.store().create_node(&tenant, &actor, new()).await.unwrap();
    let err = engine.store().create_node(&tenant, &actor, new()).await.unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_EXTERNAL_SOURCE");

    // Same external id under another type or tenant is fine
    engine
        .store()
        .create_node(&tenant, &actor, NewNode::new(NodeType::Influencer, "Jane").with_external_source("muckrack:42"))
        .await
        .unwrap();
    engine
        .store()
        .create_node(&TenantId::new("globex"), &actor, new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cross_tenant_edge_rejected() {
    let engine = engine();
    let actor = Actor::system();
    let acme = TenantId::new("acme");
    let globex = TenantId::new("globex");
    let a = engine.store().create_node(&acme, &actor, NewNode::new(NodeType::Person, "A")).await.unwrap();
    let b = engine.store().create_node(&globex, &actor, NewNode::new(NodeType::Article, "B")).await.unwrap();

    let err = engine
        .store()
        .create_edge(&acme, &actor, NewEdge::new(EdgeType::AuthoredBy, a.id, b.id))
        .await
        .unwrap_err();
    assert_eq!(err, GraphError::CrossTenant { id: b.id.0 });
    assert_eq!(err.code(), "CROSS_TENANT");

    // Reads never reveal the other tenant's node
    assert!(matches!(
        engine.store().get_node(&acme, b.id).await,
        Err(GraphError::NotFound { .. })
    ));
    assert_eq!(engine.store().tenant_stats(&acme).await.edge_count, 0);
}

#[tokio::test]
async fn test_writes_to_foreign_entities_fail_closed() {
    let engine = engine();
    let store = engine.store();
    let actor = Actor::user("intruder");
    let acme = TenantId::new("acme");
    let globex = TenantId::new("globex");
    let a = store.create_node(&acme, &actor, NewNode::new(NodeType::Person, "A")).await.unwrap();
    let b = store.create_node(&acme, &actor, NewNode::new(NodeType::Article, "B")).await.unwrap();
    let e = store
        .create_edge(&acme, &actor, NewEdge::new(EdgeType::AuthoredBy, a.id, b.id))
        .await
        .unwrap();

    // globex has no partition yet
    let err = store
        .update_node(&globex, &actor, a.id, NodePatch::default().label("x"))
        .await
        .unwrap_err();
    assert_eq!(err, GraphError::CrossTenant { id: a.id.0 });
    assert_eq!(
        store.delete_edge(&globex, &actor, e.id).await.unwrap_err(),
        GraphError::CrossTenant { id: e.id.0 }
    );

    store.create_node(&globex, &actor, NewNode::new(NodeType::Topic, "theirs")).await.unwrap();
    let err = store
        .update_node(&globex, &actor, a.id, NodePatch::default().label("x"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CROSS_TENANT");
    let err = store.delete_node(&globex, &actor, b.id).await.unwrap_err();
    assert_eq!(err.code(), "CROSS_TENANT");
    let err = store
        .update_edge(&globex, &actor, e.id, EdgePatch::default().weight(2.0))
        .await
        .unwrap_err();
    assert_eq!(err, GraphError::CrossTenant { id: e.id.0 });
    let err = store.delete_edge(&globex, &actor, e.id).await.unwrap_err();
    assert_eq!(err.code(), "CROSS_TENANT");
    let err = store.merge_nodes(&globex, &actor, a.id, &[b.id]).await.unwrap_err();
    assert_eq!(err.code(), "CROSS_TENANT");

    // Nothing changed in acme, and ids nobody owns stay idempotent
    assert_eq!(store.get_edge(&acme, e.id).await.unwrap().version, e.version);
    assert_eq!(store.tenant_stats(&acme).await.node_count, 2);
    store.delete_edge(&acme, &actor, e.id).await.unwrap();
    assert!(!store.delete_edge(&globex, &actor, e.id).await.unwrap());
    assert_eq!(store.tenant_stats(&acme).await.edge_count, 0);
}

#[tokio::test]
async fn test_missing_endpoint_is_not_found() {
    let engine = engine();
    let tenant = TenantId::new("acme");
    let actor = Actor::system();
    let a = engine.store().create_node(&tenant, &actor, NewNode::new(NodeType::Person, "A")).await.unwrap();
    let err = engine
        .store()
        .create_edge(&tenant, &actor, NewEdge::new(EdgeType::Follows, a.id, intelgraph::NodeId::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_delete_cascades_to_edges() {
    let engine = engine();
    let tenant = TenantId::new("acme");
    let actor = Actor::user("u-7");
    let store = engine.store();
    let a = store.create_node(&tenant, &actor, NewNode::new(NodeType::Person, "A")).await.unwrap();
    let b = store.create_node(&tenant, &actor, NewNode::new(NodeType::Article, "B")).await.unwrap();
    let c = store.create_node(&tenant, &actor, NewNode::new(NodeType::Topic, "C")).await.unwrap();
    store.create_edge(&tenant, &actor, NewEdge::new(EdgeType::AuthoredBy, a.id, b.id)).await.unwrap();
    store.create_edge(&tenant, &actor, NewEdge::new(EdgeType::Mentions, b.id, c.id)).await.unwrap();
    store.create_edge(&tenant, &actor, NewEdge::new(EdgeType::Follows, c.id, a.id)).await.unwrap();

    assert!(store.delete_node(&tenant, &actor, b.id).await.unwrap());

    assert!(store.find_edges_by_node(&tenant, b.id, Direction::Both).await.is_empty());
    assert_eq!(store.find_edges_by_node(&tenant, a.id, Direction::Both).await.len(), 1);
    assert_eq!(store.tenant_stats(&tenant).await.edge_count, 1);

    let entries = engine.audit().entries_for_target(&tenant, b.id).await;
    let deleted = entries.last().unwrap();
    assert_eq!(deleted.event_type, AuditEventType::Deleted);
    let edges = &deleted.previous_state.as_ref().unwrap()["edges"];
    assert_eq!(edges.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_merge_keeps_primary_label_and_repoints_edges() {
    let engine = engine();
    let tenant = TenantId::new("acme");
    let actor = Actor::user("editor");
    let store = engine.store();

    let primary = store
        .create_node(
            &tenant,
            &actor,
            NewNode::new(NodeType::Journalist, "Jane Doe").with_property("label", "Jane Doe"),
        )
        .await
        .unwrap();
    let dup = store
        .create_node(
            &tenant,
            &actor,
            NewNode::new(NodeType::Journalist, "J. Doe")
                .with_property("label", "J. Doe")
                .with_property("beat", "climate")
                .with_external_source("crm:9"),
        )
        .await
        .unwrap();
    let outlet = store.create_node(&tenant, &actor, NewNode::new(NodeType::MediaOutlet, "Daily")).await.unwrap();
    let edge = store
        .create_edge(&tenant, &actor, NewEdge::new(EdgeType::WritesFor, dup.id, outlet.id))
        .await
        .unwrap();

    let merged = store.merge_nodes(&tenant, &actor, primary.id, &[dup.id]).await.unwrap();
    assert_eq!(merged.get_property("label"), Some(&PropertyValue::from("Jane Doe")));
    assert_eq!(merged.get_property("beat"), Some(&PropertyValue::from("climate")));
    assert_eq!(merged.version, primary.version + 1);

    assert!(matches!(store.get_node(&tenant, dup.id).await, Err(GraphError::NotFound { .. })));
    let moved = store.get_edge(&tenant, edge.id).await.unwrap();
    assert_eq!(moved.source, primary.id);

    let merged_entries: Vec<_> = engine
        .audit()
        .entries(&tenant)
        .await
        .into_iter()
        .filter(|e| e.event_type == AuditEventType::Merged)
        .collect();
    assert_eq!(merged_entries.len(), 1);
    assert_eq!(merged_entries[0].target_id, dup.id.0);
    assert_eq!(merged_entries[0].previous_state.as_ref().unwrap()["node"]["label"], "J. Doe");

    // Re-ingesting the duplicate's upstream record lands on the primary
    let (node, outcome) = store
        .upsert_node(
            &tenant,
            &actor,
            NodeUpsert {
                node_type: NodeType::Journalist,
                external_source_id: "crm:9".to_string(),
                label: "Jane Doe".to_string(),
                properties: PropertyMap::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(node.id, primary.id);
    assert_eq!(outcome, UpsertOutcome::Unchanged);
}

#[tokio::test]
async fn test_merge_argument_errors() {
    let engine = engine();
    let tenant = TenantId::new("acme");
    let actor = Actor::system();
    let store = engine.store();
    let a = store.create_node(&tenant, &actor, NewNode::new(NodeType::Topic, "A")).await.unwrap();
    let foreign = store
        .create_node(&TenantId::new("globex"), &actor, NewNode::new(NodeType::Topic, "F"))
        .await
        .unwrap();

    let err = store.merge_nodes(&tenant, &actor, a.id, &[a.id]).await.unwrap_err();
    assert_eq!(err.code(), "MERGE_CONFLICT");

    let err = store.merge_nodes(&tenant, &actor, a.id, &[foreign.id]).await.unwrap_err();
    assert_eq!(err.code(), "CROSS_TENANT");

    let unchanged = store.merge_nodes(&tenant, &actor, a.id, &[]).await.unwrap();
    assert_eq!(unchanged.version, a.version);
}

#[tokio::test]
async fn test_failed_commit_leaves_no_trace() {
    let backend = Arc::new(FlakyBackend {
        inner: MemoryBackend::new(),
        failing: AtomicBool::new(false),
    });
    let engine = IntelligenceGraph::open_with(EngineConfig::default(), backend.clone(), Collaborators::default()).unwrap();
    let tenant = TenantId::new("acme");
    let actor = Actor::system();
    let store = engine.store();

    let a = store.create_node(&tenant, &actor, NewNode::new(NodeType::Person, "A")).await.unwrap();
    let b = store.create_node(&tenant, &actor, NewNode::new(NodeType::Person, "B")).await.unwrap();
    let c = store.create_node(&tenant, &actor, NewNode::new(NodeType::Topic, "C")).await.unwrap();
    store.create_edge(&tenant, &actor, NewEdge::new(EdgeType::Follows, b.id, c.id)).await.unwrap();
    let audit_before = engine.audit().entries(&tenant).await.len();

    backend.failing.store(true, Ordering::SeqCst);
    let err = store.merge_nodes(&tenant, &actor, a.id, &[b.id]).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.public_message(), "storage temporarily unavailable, try again");

    let err = store.delete_node(&tenant, &actor, c.id).await.unwrap_err();
    assert_eq!(err.code(), "STORAGE_UNAVAILABLE");

    // Nothing moved, nothing deleted, nothing audited
    assert!(store.get_node(&tenant, b.id).await.is_ok());
    assert_eq!(store.find_edges_by_node(&tenant, b.id, Direction::Both).await.len(), 1);
    assert_eq!(store.tenant_stats(&tenant).await.node_count, 3);
    assert_eq!(engine.audit().entries(&tenant).await.len(), audit_before);
    assert_eq!(engine.audit().verify_chain(&tenant).await.unwrap(), audit_before);

    backend.failing.store(false, Ordering::SeqCst);
    store.merge_nodes(&tenant, &actor, a.id, &[b.id]).await.unwrap();
    assert_eq!(engine.audit().verify_chain(&tenant).await.unwrap(), audit_before + 1);
}

#[tokio::test]
async fn test_preview_merge_is_read_only() {
    let engine = engine();
    let tenant = TenantId::new("acme");
    let actor = Actor::user("reviewer");
    let store = engine.store();
    let a = store.create_node(&tenant, &actor, NewNode::new(NodeType::Organization, "Acme")).await.unwrap();
    let b = store.create_node(&tenant, &actor, NewNode::new(NodeType::Organization, "ACME Inc")).await.unwrap();
    let link = store.create_edge(&tenant, &actor, NewEdge::new(EdgeType::RelatedTo, a.id, b.id)).await.unwrap();

    let preview = store.preview_merge(&tenant, &actor, a.id, &[b.id]).await.unwrap();
    assert_eq!(preview.dropped_edges, vec![link.id]);
    assert!(preview.repointed_edges.is_empty());
    assert!(store.get_node(&tenant, b.id).await.is_ok());

    let last = engine.audit().entries(&tenant).await.pop().unwrap();
    assert_eq!(last.event_type, AuditEventType::MergePreviewed);
}

#[tokio::test]
async fn test_upsert_edge_with_unknown_reference() {
    let engine = engine();
    let tenant = TenantId::new("acme");
    let actor = Actor::ai("seo");
    let err = engine
        .store()
        .upsert_edge(
            &tenant,
            &actor,
            EdgeUpsert {
                edge_type: EdgeType::RanksFor,
                source: NodeRef::External { node_type: NodeType::WebPage, external_source_id: "p:1".to_string() },
                target: NodeRef::External { node_type: NodeType::Keyword, external_source_id: "k:1".to_string() },
                weight: None,
                properties: PropertyMap::new(),
                external_source_id: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_schema_rules_enforced() {
    let engine = engine();
    let tenant = TenantId::new("acme");
    let actor = Actor::system();
    let err = engine
        .store()
        .create_node(&tenant, &actor, NewNode::new(NodeType::Kpi, "Share of voice"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SCHEMA_VIOLATION");

    engine
        .store()
        .create_node(&tenant, &actor, NewNode::new(NodeType::Kpi, "Share of voice").with_property("value", 0.42))
        .await
        .unwrap();
    let kpis = engine
        .store()
        .list_nodes(&tenant, NodeQuery { node_type: Some(NodeType::Kpi), limit: None })
        .await;
    assert_eq!(kpis.len(), 1);
}
