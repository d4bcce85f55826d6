//! Node and edge embeddings
//!
//! Embeddings are a derived index for semantic search, not graph structure.
//! Each record stores the hash of the canonical text it was generated from,
//! so unchanged entities are not re-embedded.

use super::edge::IntelligenceEdge;
use super::node::IntelligenceNode;
use super::types::{EdgeId, NodeId, TenantId};
use crate::llm::LLMProvider;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Entity an embedding is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddingTarget {
    Node(NodeId),
    Edge(EdgeId),
}

impl EmbeddingTarget {
    pub fn as_uuid(&self) -> uuid::Uuid {
        match self {
            EmbeddingTarget::Node(id) => id.0,
            EmbeddingTarget::Edge(id) => id.0,
        }
    }
}

/// Latest embedding of one node or edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub target: EmbeddingTarget,
    pub tenant_id: TenantId,
    pub vector: Vec<f32>,
    pub provider: LLMProvider,
    pub generated_at: DateTime<Utc>,
    /// SHA-256 of the canonical text the vector was computed from
    pub content_hash: String,
}

impl EmbeddingRecord {
    /// An embedding is stale once it is older than `window`, or when the
    /// entity's canonical text has changed since it was generated.
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration, current_hash: Option<&str>) -> bool {
        if now - self.generated_at > window {
            return true;
        }
        match current_hash {
            Some(hash) => hash != self.content_hash,
            None => false,
        }
    }
}

/// Canonical text of a node: type, label, then properties in key order
pub fn node_text(node: &IntelligenceNode) -> String {
    let mut text = format!("{}: {}", node.node_type, node.label);
    for (key, value) in &node.properties {
        let _ = write!(text, "\n{}: {}", key, value);
    }
    text
}

/// Canonical text of an edge, rendered as a sentence between its endpoint labels
pub fn edge_text(edge: &IntelligenceEdge, source_label: &str, target_label: &str) -> String {
    let mut text = format!("{} {} {}", source_label, edge.edge_type, target_label);
    for (key, value) in &edge.properties {
        let _ = write!(text, "\n{}: {}", key, value);
    }
    text
}

/// Lowercase hex SHA-256 of `text`
pub fn content_hash(text: &str) -> String {
    hex_digest(Sha256::digest(text.as_bytes()).as_slice())
}

pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Cosine similarity; 0 for mismatched dimensions or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
