//! Append-only, hash-chained audit log
//!
//! Entries are staged inside the unit of work of the mutation they describe
//! and only become visible after the storage batch carrying them commits.
//! There is no API to edit or remove an entry.

use crate::graph::embedding::hex_digest;
use crate::graph::TenantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// Hash preceding the first entry of every tenant chain
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuditError {
    #[error("audit chain for tenant {tenant} broken at sequence {sequence}: {reason}")]
    ChainBroken {
        tenant: String,
        sequence: u64,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Created,
    Updated,
    Merged,
    Deleted,
    Traversed,
    Snapshotted,
    MergePreviewed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    System,
    Ai,
}

/// Who triggered an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub actor_type: ActorType,
    pub actor_id: String,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Actor { actor_type: ActorType::User, actor_id: id.into() }
    }

    pub fn ai(id: impl Into<String>) -> Self {
        Actor { actor_type: ActorType::Ai, actor_id: id.into() }
    }

    pub fn system() -> Self {
        Actor { actor_type: ActorType::System, actor_id: "system".to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Node,
    Edge,
    Snapshot,
    Path,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub tenant_id: TenantId,
    /// Position in the tenant chain, starting at 1
    pub sequence: u64,
    pub event_type: AuditEventType,
    pub actor: Actor,
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    pub previous_state: Option<serde_json::Value>,
    pub new_state: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditLogEntry {
    fn compute_hash(&self) -> String {
        #[derive(Serialize)]
        struct Content<'a> {
            id: &'a Uuid,
            tenant_id: &'a TenantId,
            sequence: u64,
            event_type: AuditEventType,
            actor: &'a Actor,
            target_kind: TargetKind,
            target_id: &'a Uuid,
            previous_state: &'a Option<serde_json::Value>,
            new_state: &'a Option<serde_json::Value>,
            timestamp: &'a DateTime<Utc>,
            prev_hash: &'a str,
        }

        let content = Content {
            id: &self.id,
            tenant_id: &self.tenant_id,
            sequence: self.sequence,
            event_type: self.event_type,
            actor: &self.actor,
            target_kind: self.target_kind,
            target_id: &self.target_id,
            previous_state: &self.previous_state,
            new_state: &self.new_state,
            timestamp: &self.timestamp,
            prev_hash: &self.prev_hash,
        };
        // Serializing plain data into a Vec cannot fail.
        let bytes = serde_json::to_vec(&content).unwrap_or_default();
        hex_digest(Sha256::digest(&bytes).as_slice())
    }
}

/// An audit entry before it is sequenced and hashed
#[derive(Debug, Clone)]
pub struct AuditDraft {
    pub event_type: AuditEventType,
    pub actor: Actor,
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    pub previous_state: Option<serde_json::Value>,
    pub new_state: Option<serde_json::Value>,
}

impl AuditDraft {
    pub fn new(event_type: AuditEventType, actor: &Actor, target_kind: TargetKind, target_id: impl Into<Uuid>) -> Self {
        AuditDraft {
            event_type,
            actor: actor.clone(),
            target_kind,
            target_id: target_id.into(),
            previous_state: None,
            new_state: None,
        }
    }

    pub fn previous<T: Serialize>(mut self, state: &T) -> Self {
        self.previous_state = serde_json::to_value(state).ok();
        self
    }

    pub fn new_state<T: Serialize>(mut self, state: &T) -> Self {
        self.new_state = serde_json::to_value(state).ok();
        self
    }
}

#[derive(Debug)]
struct AuditChain {
    entries: Vec<AuditLogEntry>,
}

impl AuditChain {
    fn head(&self) -> (u64, String) {
        match self.entries.last() {
            Some(last) => (last.sequence, last.hash.clone()),
            None => (0, GENESIS_HASH.to_string()),
        }
    }
}

/// Exclusive access to one tenant chain while a unit of work is in flight.
/// Dropping it without [`AuditTxn::commit`] discards every staged entry.
pub struct AuditTxn {
    tenant: TenantId,
    chain: OwnedMutexGuard<AuditChain>,
    staged: Vec<AuditLogEntry>,
}

impl AuditTxn {
    /// Sequence, timestamp and hash `draft` on top of the chain head
    pub fn stage(&mut self, draft: AuditDraft) -> AuditLogEntry {
        let (sequence, prev_hash) = match self.staged.last() {
            Some(last) => (last.sequence, last.hash.clone()),
            None => self.chain.head(),
        };
        let mut entry = AuditLogEntry {
            id: Uuid::new_v4(),
            tenant_id: self.tenant.clone(),
            sequence: sequence + 1,
            event_type: draft.event_type,
            actor: draft.actor,
            target_kind: draft.target_kind,
            target_id: draft.target_id,
            previous_state: draft.previous_state,
            new_state: draft.new_state,
            timestamp: Utc::now(),
            prev_hash,
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        self.staged.push(entry.clone());
        entry
    }

    /// Make staged entries visible. Call only after they are durable.
    pub fn commit(mut self) -> Vec<AuditLogEntry> {
        let staged = std::mem::take(&mut self.staged);
        self.chain.entries.extend(staged.iter().cloned());
        staged
    }
}

/// Per-tenant audit chains
#[derive(Debug, Default)]
pub struct AuditLog {
    chains: RwLock<HashMap<TenantId, Arc<Mutex<AuditChain>>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed chains from persisted entries
    pub fn restore(entries: HashMap<TenantId, Vec<AuditLogEntry>>) -> Self {
        let chains = entries
            .into_iter()
            .map(|(tenant, mut entries)| {
                entries.sort_by_key(|e| e.sequence);
                (tenant, Arc::new(Mutex::new(AuditChain { entries })))
            })
            .collect();
        AuditLog { chains: RwLock::new(chains) }
    }

    async fn chain(&self, tenant: &TenantId) -> Arc<Mutex<AuditChain>> {
        if let Some(chain) = self.chains.read().await.get(tenant) {
            return Arc::clone(chain);
        }
        let mut chains = self.chains.write().await;
        Arc::clone(
            chains
                .entry(tenant.clone())
                .or_insert_with(|| Arc::new(Mutex::new(AuditChain { entries: Vec::new() }))),
        )
    }

    /// Lock the tenant chain for a unit of work
    pub async fn begin(&self, tenant: &TenantId) -> AuditTxn {
        let chain = self.chain(tenant).await.lock_owned().await;
        AuditTxn {
            tenant: tenant.clone(),
            chain,
            staged: Vec::new(),
        }
    }

    async fn existing(&self, tenant: &TenantId) -> Option<Arc<Mutex<AuditChain>>> {
        self.chains.read().await.get(tenant).cloned()
    }

    pub async fn entries(&self, tenant: &TenantId) -> Vec<AuditLogEntry> {
        let Some(chain) = self.existing(tenant).await else {
            return Vec::new();
        };
        let guard = chain.lock().await;
        guard.entries.clone()
    }

    pub async fn entries_for_target(&self, tenant: &TenantId, target: impl Into<Uuid>) -> Vec<AuditLogEntry> {
        let target = target.into();
        let Some(chain) = self.existing(tenant).await else {
            return Vec::new();
        };
        let guard = chain.lock().await;
        guard
            .entries
            .iter()
            .filter(|e| e.target_id == target)
            .cloned()
            .collect()
    }

    pub async fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self.chains.read().await.keys().cloned().collect();
        tenants.sort();
        tenants
    }

    /// Recompute the tenant chain. Returns the number of verified entries.
    pub async fn verify_chain(&self, tenant: &TenantId) -> Result<usize, AuditError> {
        let Some(chain) = self.existing(tenant).await else {
            return Ok(0);
        };
        let guard = chain.lock().await;
        verify_entries(tenant, &guard.entries)?;
        Ok(guard.entries.len())
    }
}

/// Check sequence continuity, hash links and entry hashes
pub fn verify_entries(tenant: &TenantId, entries: &[AuditLogEntry]) -> Result<(), AuditError> {
    let mut prev_hash = GENESIS_HASH.to_string();
    for (i, entry) in entries.iter().enumerate() {
        let broken = |reason: &str| AuditError::ChainBroken {
            tenant: tenant.to_string(),
            sequence: entry.sequence,
            reason: reason.to_string(),
        };
        if entry.sequence != i as u64 + 1 {
            return Err(broken("sequence gap"));
        }
        if entry.prev_hash != prev_hash {
            return Err(broken("previous hash mismatch"));
        }
        if entry.compute_hash() != entry.hash {
            return Err(broken("entry hash mismatch"));
        }
        prev_hash = entry.hash.clone();
    }
    Ok(())
}
