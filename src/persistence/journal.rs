//! Journal: commits entity writes and their audit entries as one batch

use super::{StorageBackend, StorageResult, WriteBatch};
use crate::audit::{AuditDraft, AuditLog, AuditLogEntry};
use crate::graph::TenantId;
use std::sync::Arc;
use tracing::{debug, error};

pub struct Journal {
    backend: Arc<dyn StorageBackend>,
    audit: AuditLog,
}

impl Journal {
    pub fn new(backend: Arc<dyn StorageBackend>, audit: AuditLog) -> Self {
        Journal { backend, audit }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Stage `drafts` into `batch` and commit it. If the backend rejects the
    /// batch the audit chain is left untouched and the error is returned.
    pub async fn commit(&self, mut batch: WriteBatch, drafts: Vec<AuditDraft>) -> StorageResult<Vec<AuditLogEntry>> {
        let mut txn = self.audit.begin(&batch.tenant).await;
        for draft in drafts {
            let entry = txn.stage(draft);
            batch.append_audit(entry);
        }

        if let Err(e) = self.backend.commit(&batch) {
            error!(tenant = %batch.tenant, ops = batch.len(), error = %e, "Batch commit failed");
            return Err(e);
        }
        debug!(tenant = %batch.tenant, ops = batch.len(), "Batch committed");
        Ok(txn.commit())
    }

    /// Write a single audit entry with no accompanying entity writes
    pub async fn record(&self, tenant: &TenantId, draft: AuditDraft) -> StorageResult<AuditLogEntry> {
        let mut entries = self.commit(WriteBatch::new(tenant.clone()), vec![draft]).await?;
        entries
            .pop()
            .ok_or_else(|| super::StorageError::Corrupt("audit entry not staged".to_string()))
    }

    /// Commit a batch that carries no audit entries (derived analytics fields)
    pub fn commit_unaudited(&self, batch: &WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.backend.commit(batch)
    }
}
