//! Schema registry
//!
//! Validates property shape per node/edge type at the write boundary.
//! Types without a rule accept any properties except the reserved keys.

use super::error::{GraphError, GraphResult};
use super::property::{PropertyKind, PropertyMap};
use super::types::{EdgeType, NodeType};
use std::collections::HashMap;

/// Property keys written only by the analytics engine
pub const RESERVED_KEYS: &[&str] = &["centralityScore", "clusterId"];

/// Shape rule for one node or edge type
#[derive(Debug, Clone, Default)]
pub struct PropertyRule {
    pub required: Vec<String>,
    pub typed: HashMap<String, PropertyKind>,
}

impl PropertyRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, key: &str, kind: PropertyKind) -> Self {
        self.required.push(key.to_string());
        self.typed.insert(key.to_string(), kind);
        self
    }

    pub fn optional(mut self, key: &str, kind: PropertyKind) -> Self {
        self.typed.insert(key.to_string(), kind);
        self
    }
}

#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    nodes: HashMap<NodeType, PropertyRule>,
    edges: HashMap<EdgeType, PropertyRule>,
}

impl SchemaRegistry {
    /// Registry with no rules; only reserved keys are checked
    pub fn permissive() -> Self {
        SchemaRegistry {
            nodes: HashMap::new(),
            edges: HashMap::new(),
        }
    }

    pub fn register_node(&mut self, node_type: NodeType, rule: PropertyRule) {
        self.nodes.insert(node_type, rule);
    }

    pub fn register_edge(&mut self, edge_type: EdgeType, rule: PropertyRule) {
        self.edges.insert(edge_type, rule);
    }

    pub fn validate_node(&self, node_type: NodeType, properties: &PropertyMap) -> GraphResult<()> {
        validate(node_type.as_str(), self.nodes.get(&node_type), properties)
    }

    pub fn validate_edge(&self, edge_type: EdgeType, properties: &PropertyMap) -> GraphResult<()> {
        validate(edge_type.as_str(), self.edges.get(&edge_type), properties)
    }
}

/// Rules shipped for the most common upstream record types
impl Default for SchemaRegistry {
    fn default() -> Self {
        use PropertyKind as K;

        let mut registry = SchemaRegistry::permissive();
        registry.register_node(
            NodeType::Journalist,
            PropertyRule::new()
                .optional("email", K::String)
                .optional("beats", K::Array)
                .optional("outlet", K::String),
        );
        registry.register_node(
            NodeType::Keyword,
            PropertyRule::new()
                .optional("searchVolume", K::Integer)
                .optional("difficulty", K::Number)
                .optional("intent", K::String),
        );
        registry.register_node(
            NodeType::Article,
            PropertyRule::new()
                .optional("url", K::String)
                .optional("publishedAt", K::DateTime)
                .optional("wordCount", K::Integer),
        );
        registry.register_node(
            NodeType::Kpi,
            PropertyRule::new().require("value", K::Number).optional("unit", K::String),
        );
        registry.register_node(
            NodeType::Domain,
            PropertyRule::new().optional("authority", K::Number),
        );
        registry.register_edge(
            EdgeType::RanksFor,
            PropertyRule::new().optional("position", K::Integer),
        );
        registry.register_edge(
            EdgeType::Mentions,
            PropertyRule::new().optional("sentiment", K::Number),
        );
        registry
    }
}

fn validate(type_name: &str, rule: Option<&PropertyRule>, properties: &PropertyMap) -> GraphResult<()> {
    for key in RESERVED_KEYS {
        if properties.contains_key(*key) {
            return Err(violation(type_name, key, "reserved for analytics output"));
        }
    }

    let Some(rule) = rule else {
        return Ok(());
    };

    for key in &rule.required {
        if !properties.contains_key(key) {
            return Err(violation(type_name, key, "required property missing"));
        }
    }

    for (key, value) in properties {
        if let Some(kind) = rule.typed.get(key) {
            if !value.is_null() && !value.matches(*kind) {
                return Err(violation(
                    type_name,
                    key,
                    &format!("expected {:?}, got {:?}", kind, value.kind()),
                ));
            }
        }
    }

    Ok(())
}

fn violation(type_name: &str, key: &str, reason: &str) -> GraphError {
    GraphError::SchemaViolation {
        type_name: type_name.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
