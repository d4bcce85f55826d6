//! Core intelligence graph
//!
//! This module implements the tenant-partitioned property graph:
//! - Typed nodes and directed, weighted edges with open property maps
//! - Per-type property schemas validated at the write boundary
//! - Arena-style storage: entities live in maps keyed by id and
//!   relationships are always resolved by lookup
//! - Node merging, producer upserts and embedding maintenance

pub mod edge;
pub mod embedding;
pub mod error;
pub mod merge;
pub mod node;
pub mod partition;
pub mod property;
pub mod schema;
pub mod store;
pub mod types;

// Re-export main types
pub use edge::IntelligenceEdge;
pub use embedding::{content_hash, cosine_similarity, EmbeddingRecord, EmbeddingTarget};
pub use error::{EntityKind, GraphError, GraphResult};
pub use merge::MergePreview;
pub use node::{ExternalKey, IntelligenceNode};
pub use partition::{TenantGraph, TenantStats};
pub use property::{PropertyKind, PropertyMap, PropertyValue};
pub use schema::{PropertyRule, SchemaRegistry};
pub use store::{
    EdgePatch, EdgeUpsert, GraphCapture, GraphStore, NewEdge, NewNode, NodePatch, NodeQuery, NodeRef, NodeUpsert,
    ReembedReport, StoreOptions, UpsertOutcome,
};
pub use types::{Direction, EdgeId, EdgeType, NodeId, NodeType, SnapshotId, TenantId};
