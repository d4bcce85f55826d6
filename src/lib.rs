//! Intelgraph: unified intelligence graph
//!
//! A multi-tenant property-graph engine for the entities and relationships
//! emitted by content, PR, SEO, persona and executive-reporting pipelines.
//!
//! # Architecture
//!
//! - **Graph Store** (`graph`): tenant partitions of typed nodes and edges,
//!   schema validation, merges, producer upserts, embedding maintenance
//! - **Traversal Engine** (`traversal`): bounded BFS and hop-count paths,
//!   path narration through the LLM collaborator
//! - **Analytics Engine** (`analytics`): degree centrality, PageRank and
//!   connected-component clusters written back as derived node fields
//! - **Semantic Search** (`search`): cosine ranking over embeddings with an
//!   HNSW candidate index for large tenants
//! - **Snapshots** (`snapshot`): immutable captures and structural diffs
//! - **Audit Log** (`audit`): hash-chained record of every mutation,
//!   committed in the same storage batch as the mutation
//!
//! Storage goes through a [`persistence::StorageBackend`]: RocksDB on disk,
//! or an in-memory backend.
//!
//! ## Example Usage
//!
//! ```rust
//! use intelgraph::audit::Actor;
//! use intelgraph::graph::{Direction, EdgeType, NewEdge, NewNode, NodeType, TenantId};
//! use intelgraph::traversal::TraversalRequest;
//! use intelgraph::{EngineConfig, IntelligenceGraph};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let engine = IntelligenceGraph::open(EngineConfig::default()).unwrap();
//! let tenant = TenantId::new("acme");
//! let actor = Actor::user("analyst-1");
//!
//! let ada = engine.store().create_node(&tenant, &actor, NewNode::new(NodeType::Person, "Ada")).await.unwrap();
//! let post = engine.store().create_node(&tenant, &actor, NewNode::new(NodeType::Article, "Engines")).await.unwrap();
//! engine
//!     .store()
//!     .create_edge(&tenant, &actor, NewEdge::new(EdgeType::AuthoredBy, ada.id, post.id))
//!     .await
//!     .unwrap();
//!
//! let hits = engine
//!     .traversal()
//!     .traverse(&tenant, &TraversalRequest::new(ada.id, Direction::Outbound, 1), &CancellationToken::new())
//!     .await
//!     .unwrap();
//! assert_eq!(hits.len(), 2);
//! # });
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod analytics;
pub mod audit;
pub mod config;
pub mod engine;
pub mod graph;
pub mod llm;
pub mod persistence;
pub mod search;
pub mod snapshot;
pub mod traversal;

// Re-export main types for convenience
pub use graph::{
    Direction, EdgeId, EdgeType, GraphError, GraphResult, GraphStore, IntelligenceEdge, IntelligenceNode, NodeId,
    NodeType, PropertyMap, PropertyValue, TenantId,
};

pub use analytics::{AnalyticsEngine, Cluster, NodeCentrality};
pub use audit::{Actor, AuditLog, AuditLogEntry};
pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineError, IntelligenceGraph};
pub use persistence::{MemoryBackend, RocksBackend, StorageBackend, StorageError, StorageResult};
pub use search::{SearchRequest, SearchResults, SemanticSearch};
pub use snapshot::{GraphDiff, GraphSnapshot, SnapshotManager};
pub use traversal::{Path, TraversalEngine, TraversalRequest};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
        assert_eq!(ver, "0.1.0");
    }
}
