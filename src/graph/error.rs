//! Graph error taxonomy

use super::types::{EdgeType, NodeType};
use crate::llm::CollaboratorError;
use crate::persistence::StorageError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Kind of entity an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Edge,
    Snapshot,
    Embedding,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Node => write!(f, "node"),
            EntityKind::Edge => write!(f, "edge"),
            EntityKind::Snapshot => write!(f, "snapshot"),
            EntityKind::Embedding => write!(f, "embedding"),
        }
    }
}

/// Errors returned by the graph store and the engines that read it
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Missing entity, or an entity owned by another tenant
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("{type_name} with external source id '{external_source_id}' already exists")]
    DuplicateExternalSource {
        type_name: String,
        external_source_id: String,
    },

    /// A write referenced an entity that belongs to a different tenant
    #[error("entity {id} belongs to a different tenant")]
    CrossTenant { id: Uuid },

    #[error("self-loops are not permitted for edge type {0}")]
    InvalidSelfLoop(EdgeType),

    /// Merge rejected; nothing was applied
    #[error("merge conflict: {0}")]
    MergeConflict(String),

    #[error("collaborator timed out after {0:?}")]
    CollaboratorTimeout(Duration),

    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("{type_name} property '{key}': {reason}")]
    SchemaViolation {
        type_name: String,
        key: String,
        reason: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Optimistic-concurrency check failed
    #[error("stale write on {id}: expected version {expected}, found {actual}")]
    StaleWrite { id: Uuid, expected: u64, actual: u64 },

    #[error("operation cancelled")]
    Cancelled,
}

pub type GraphResult<T> = Result<T, GraphError>;

impl GraphError {
    pub fn node_not_found(id: impl Into<Uuid>) -> Self {
        GraphError::NotFound { kind: EntityKind::Node, id: id.into() }
    }

    pub fn edge_not_found(id: impl Into<Uuid>) -> Self {
        GraphError::NotFound { kind: EntityKind::Edge, id: id.into() }
    }

    pub(crate) fn duplicate_node(node_type: NodeType, external_source_id: &str) -> Self {
        GraphError::DuplicateExternalSource {
            type_name: node_type.to_string(),
            external_source_id: external_source_id.to_string(),
        }
    }

    pub(crate) fn duplicate_edge(edge_type: EdgeType, external_source_id: &str) -> Self {
        GraphError::DuplicateExternalSource {
            type_name: edge_type.to_string(),
            external_source_id: external_source_id.to_string(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::NotFound { .. } => "NOT_FOUND",
            GraphError::DuplicateExternalSource { .. } => "DUPLICATE_EXTERNAL_SOURCE",
            GraphError::CrossTenant { .. } => "CROSS_TENANT",
            GraphError::InvalidSelfLoop(_) => "INVALID_SELF_LOOP",
            GraphError::MergeConflict(_) => "MERGE_CONFLICT",
            GraphError::CollaboratorTimeout(_) | GraphError::Collaborator(_) => "COLLABORATOR_TIMEOUT",
            GraphError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            GraphError::SchemaViolation { .. } => "SCHEMA_VIOLATION",
            GraphError::InvalidArgument(_) => "INVALID_ARGUMENT",
            GraphError::StaleWrite { .. } => "STALE_WRITE",
            GraphError::Cancelled => "CANCELLED",
        }
    }

    /// Message safe to show to an API client. Storage internals are hidden.
    pub fn public_message(&self) -> String {
        match self {
            GraphError::StorageUnavailable(_) => "storage temporarily unavailable, try again".to_string(),
            GraphError::Collaborator(_) => "external collaborator unavailable".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, GraphError::StorageUnavailable(_))
    }
}

impl From<StorageError> for GraphError {
    fn from(e: StorageError) -> Self {
        GraphError::StorageUnavailable(e.to_string())
    }
}

impl From<CollaboratorError> for GraphError {
    fn from(e: CollaboratorError) -> Self {
        match e {
            CollaboratorError::Timeout(d) => GraphError::CollaboratorTimeout(d),
            other => GraphError::Collaborator(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;

    #[test]
    fn test_codes() {
        assert_eq!(GraphError::node_not_found(NodeId::new()).code(), "NOT_FOUND");
        assert_eq!(GraphError::InvalidSelfLoop(EdgeType::Cites).code(), "INVALID_SELF_LOOP");
        assert_eq!(GraphError::Cancelled.code(), "CANCELLED");
    }

    #[test]
    fn test_storage_errors_are_hidden_and_retryable() {
        let err: GraphError = StorageError::ColumnFamily("nodes".to_string()).into();
        assert!(err.is_retryable());
        assert_eq!(err.code(), "STORAGE_UNAVAILABLE");
        assert!(!err.public_message().contains("nodes"));
        assert!(!GraphError::MergeConflict("x".into()).is_retryable());
    }

    #[test]
    fn test_collaborator_timeout_conversion() {
        let err: GraphError = CollaboratorError::Timeout(Duration::from_millis(50)).into();
        assert_eq!(err, GraphError::CollaboratorTimeout(Duration::from_millis(50)));
    }
}
