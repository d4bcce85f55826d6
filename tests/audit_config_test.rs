use intelgraph::audit::{verify_entries, Actor, ActorType, AuditEventType, TargetKind};
use intelgraph::graph::{NewNode, NodePatch, NodeType, TenantId};
use intelgraph::{EngineConfig, IntelligenceGraph};
use std::io::Write;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_chain_records_every_mutation() {
    let engine = IntelligenceGraph::open(EngineConfig::default()).unwrap();
    let tenant = TenantId::new("acme");
    let human = Actor::user("u-42");
    let pipeline = Actor::ai("persona-builder");

    let node = engine
        .store()
        .create_node(&tenant, &pipeline, NewNode::new(NodeType::Persona, "Ops lead"))
        .await
        .unwrap();
    engine
        .store()
        .update_node(&tenant, &human, node.id, NodePatch::default().label("Operations lead"))
        .await
        .unwrap();
    // A patch that changes nothing is not recorded
    engine
        .store()
        .update_node(&tenant, &human, node.id, NodePatch::default().label("Operations lead"))
        .await
        .unwrap();
    engine.store().delete_node(&tenant, &human, node.id).await.unwrap();

    let entries = engine.audit().entries(&tenant).await;
    let events: Vec<_> = entries.iter().map(|e| e.event_type).collect();
    assert_eq!(events, vec![AuditEventType::Created, AuditEventType::Updated, AuditEventType::Deleted]);
    assert_eq!(entries[0].actor.actor_type, ActorType::Ai);
    assert_eq!(entries[1].actor.actor_id, "u-42");
    assert!(entries.iter().all(|e| e.target_kind == TargetKind::Node));
    assert_eq!(entries[1].previous_state.as_ref().unwrap()["label"], "Ops lead");
    assert_eq!(entries[1].new_state.as_ref().unwrap()["label"], "Operations lead");
    assert_eq!(entries[2].prev_hash, entries[1].hash);

    assert_eq!(engine.audit().verify_chain(&tenant).await.unwrap(), 3);
    // Chains are per tenant
    assert!(engine.audit().entries(&TenantId::new("globex")).await.is_empty());
}

#[tokio::test]
async fn test_tampering_is_detected() {
    let engine = IntelligenceGraph::open(EngineConfig::default()).unwrap();
    let tenant = TenantId::new("acme");
    let actor = Actor::system();
    for label in ["a", "b", "c"] {
        engine
            .store()
            .create_node(&tenant, &actor, NewNode::new(NodeType::Topic, label))
            .await
            .unwrap();
    }

    let mut entries = engine.audit().entries(&tenant).await;
    assert!(verify_entries(&tenant, &entries).is_ok());

    entries[1].actor = Actor::user("mallory");
    assert!(verify_entries(&tenant, &entries).is_err());

    let mut entries = engine.audit().entries(&tenant).await;
    entries.remove(1);
    assert!(verify_entries(&tenant, &entries).is_err());
}

#[test]
fn test_config_from_yaml_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "max_traversal_depth: 8\ncollaborator_timeout_ms: 1500\nsnapshot_retention: 5\nanalytics:\n  damping_factor: 0.9"
    )
    .unwrap();

    let config = EngineConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.max_traversal_depth, 8);
    assert_eq!(config.collaborator_timeout().as_millis(), 1500);
    assert_eq!(config.snapshot_retention, Some(5));
    assert_eq!(config.analytics.damping_factor, 0.9);
    assert_eq!(config.analytics.iterations, 20);
    assert!(config.data_path.is_none());
}

#[test]
fn test_invalid_config_refuses_to_open() {
    let config = EngineConfig::from_yaml_str("max_traversal_depth: 0").unwrap();
    assert!(IntelligenceGraph::open(config).is_err());
}
