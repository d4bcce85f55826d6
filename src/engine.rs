//! Engine facade
//!
//! Opens the storage backend, replays persisted tenants into memory and
//! wires the store, engines and collaborators together.

use crate::analytics::AnalyticsEngine;
use crate::audit::{AuditError, AuditLog};
use crate::config::{ConfigError, EngineConfig};
use crate::graph::{GraphStore, SchemaRegistry, StoreOptions, TenantGraph, TenantId};
use crate::llm::{CollaboratorError, Collaborators};
use crate::persistence::{Journal, MemoryBackend, RocksBackend, StorageBackend, StorageError};
use crate::search::SemanticSearch;
use crate::snapshot::SnapshotManager;
use crate::traversal::TraversalEngine;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

pub struct IntelligenceGraph {
    config: EngineConfig,
    journal: Arc<Journal>,
    store: Arc<GraphStore>,
    traversal: TraversalEngine,
    analytics: AnalyticsEngine,
    search: SemanticSearch,
    snapshots: SnapshotManager,
}

impl IntelligenceGraph {
    /// Open with the backend and collaborators described by `config`
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let backend: Arc<dyn StorageBackend> = match &config.data_path {
            Some(path) => Arc::new(RocksBackend::open(path)?),
            None => Arc::new(MemoryBackend::new()),
        };
        let collaborators = Collaborators::from_config(
            config.embedding.as_ref(),
            config.narrator.as_ref(),
            config.collaborator_timeout(),
        )?;
        Self::open_with(config, backend, collaborators)
    }

    /// Open over an explicit backend and collaborator set
    pub fn open_with(
        config: EngineConfig,
        backend: Arc<dyn StorageBackend>,
        collaborators: Collaborators,
    ) -> Result<Self, EngineError> {
        Self::open_with_schema(config, backend, collaborators, SchemaRegistry::default())
    }

    pub fn open_with_schema(
        config: EngineConfig,
        backend: Arc<dyn StorageBackend>,
        collaborators: Collaborators,
        schema: SchemaRegistry,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let images = backend.load_all()?;

        let mut audit_entries = HashMap::new();
        let mut partitions = Vec::new();
        let mut snapshots = Vec::new();
        for image in images {
            crate::audit::verify_entries(&image.tenant, &image.audit)?;
            audit_entries.insert(image.tenant.clone(), image.audit);
            snapshots.extend(image.snapshots);
            partitions.push(TenantGraph::from_records(image.tenant, image.nodes, image.edges, image.embeddings));
        }

        let journal = Arc::new(Journal::new(Arc::clone(&backend), AuditLog::restore(audit_entries)));
        let options = StoreOptions {
            schema,
            embedder: collaborators.embedder.clone(),
            collaborator_timeout: config.collaborator_timeout(),
            embedding_staleness: config.embedding_staleness(),
        };
        let mut store = GraphStore::new(Arc::clone(&journal), options);
        let tenants = partitions.len();
        for partition in partitions {
            store.restore_partition(partition);
        }
        let store = Arc::new(store);

        let mut snapshot_manager = SnapshotManager::new(Arc::clone(&store), Arc::clone(&journal), config.snapshot_retention);
        snapshot_manager.restore(snapshots);

        let traversal = TraversalEngine::new(
            Arc::clone(&store),
            Arc::clone(&journal),
            collaborators.narrator.clone(),
            config.max_traversal_depth,
            config.collaborator_timeout(),
        );
        let analytics = AnalyticsEngine::new(Arc::clone(&store), config.analytics);
        let search = SemanticSearch::new(Arc::clone(&store), config.exact_search_threshold, config.ann_oversample);

        info!(
            backend = backend.name(),
            tenants,
            embedder = collaborators.embedder.is_some(),
            narrator = collaborators.narrator.is_some(),
            "Intelligence graph opened"
        );
        Ok(IntelligenceGraph {
            config,
            journal,
            store,
            traversal,
            analytics,
            search,
            snapshots: snapshot_manager,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn traversal(&self) -> &TraversalEngine {
        &self.traversal
    }

    pub fn analytics(&self) -> &AnalyticsEngine {
        &self.analytics
    }

    pub fn search(&self) -> &SemanticSearch {
        &self.search
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    pub fn audit(&self) -> &AuditLog {
        self.journal.audit()
    }

    /// Tenants with graph data or audit history
    pub async fn tenants(&self) -> Vec<TenantId> {
        let mut tenants = self.store.tenants().await;
        for tenant in self.audit().tenants().await {
            if !tenants.contains(&tenant) {
                tenants.push(tenant);
            }
        }
        tenants.sort();
        tenants
    }
}
