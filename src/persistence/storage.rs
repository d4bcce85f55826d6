//! RocksDB storage backend
//!
//! One column family per logical table. Keys are `{tenant}\0{id}` so a
//! tenant's records are contiguous; audit keys use the zero-padded sequence
//! number as id so they iterate in chain order.

use super::{StorageBackend, StorageError, StorageResult, TenantImage, WriteBatch, WriteOp};
use crate::audit::AuditLogEntry;
use crate::graph::{EmbeddingRecord, EmbeddingTarget, IntelligenceEdge, IntelligenceNode, TenantId};
use crate::snapshot::GraphSnapshot;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteOptions, DB};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

const CF_NODES: &str = "nodes";
const CF_EDGES: &str = "edges";
const CF_EMBEDDINGS: &str = "embeddings";
const CF_SNAPSHOTS: &str = "snapshots";
const CF_AUDIT: &str = "audit";

const COLUMN_FAMILIES: [&str; 5] = [CF_NODES, CF_EDGES, CF_EMBEDDINGS, CF_SNAPSHOTS, CF_AUDIT];

/// RocksDB-based persistent storage
pub struct RocksBackend {
    db: DB,
}

impl std::fmt::Debug for RocksBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksBackend").field("path", &self.db.path()).finish()
    }
}

impl RocksBackend {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        info!("Opening persistent storage at: {}", path.display());

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_write_buffer_number(3);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_wal_recovery_mode(rocksdb::DBRecoveryMode::PointInTime);

        let mut cf_descriptors = vec![ColumnFamilyDescriptor::new("default", Options::default())];
        for name in COLUMN_FAMILIES {
            cf_descriptors.push(ColumnFamilyDescriptor::new(name, Self::cf_options(name)));
        }

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
        info!("Persistent storage opened successfully");
        Ok(Self { db })
    }

    fn cf_options(name: &str) -> Options {
        let mut opts = Options::default();
        match name {
            // Already gzip-compressed payloads.
            CF_SNAPSHOTS => opts.set_compression_type(rocksdb::DBCompressionType::None),
            CF_EMBEDDINGS => opts.set_compression_type(rocksdb::DBCompressionType::Zstd),
            _ => opts.set_compression_type(rocksdb::DBCompressionType::Lz4),
        }
        opts
    }

    fn cf(&self, name: &str) -> StorageResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamily(name.to_string()))
    }

    fn key(tenant: &TenantId, id: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(tenant.as_str().len() + 1 + id.len());
        key.extend_from_slice(tenant.as_str().as_bytes());
        key.push(0);
        key.extend_from_slice(id.as_bytes());
        key
    }

    fn embedding_id(target: &EmbeddingTarget) -> String {
        match target {
            EmbeddingTarget::Node(id) => format!("n:{}", id.0),
            EmbeddingTarget::Edge(id) => format!("e:{}", id.0),
        }
    }

    fn tenant_of(key: &[u8]) -> StorageResult<TenantId> {
        let end = key
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| StorageError::Corrupt("key without tenant prefix".to_string()))?;
        let tenant = std::str::from_utf8(&key[..end])
            .map_err(|e| StorageError::Corrupt(format!("tenant prefix: {}", e)))?;
        Ok(TenantId::new(tenant))
    }

    fn compress(bytes: &[u8]) -> StorageResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes)?;
        Ok(encoder.finish()?)
    }

    fn decompress(bytes: &[u8]) -> StorageResult<Vec<u8>> {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Visit every record of a column family as (tenant, value)
    fn scan<F>(&self, name: &str, mut visit: F) -> StorageResult<()>
    where
        F: FnMut(TenantId, &[u8]) -> StorageResult<()>,
    {
        let cf = self.cf(name)?;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            visit(Self::tenant_of(&key)?, &value)?;
        }
        Ok(())
    }

    /// Flush all data to disk
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        debug!("Flushed storage to disk");
        Ok(())
    }
}

impl StorageBackend for RocksBackend {
    fn commit(&self, batch: &WriteBatch) -> StorageResult<()> {
        let tenant = &batch.tenant;
        let mut wb = rocksdb::WriteBatch::default();

        for op in &batch.ops {
            match op {
                WriteOp::PutNode(node) => {
                    let key = Self::key(tenant, &node.id.0.to_string());
                    wb.put_cf(self.cf(CF_NODES)?, key, bincode::serialize(node)?);
                }
                WriteOp::DeleteNode(id) => {
                    wb.delete_cf(self.cf(CF_NODES)?, Self::key(tenant, &id.0.to_string()));
                }
                WriteOp::PutEdge(edge) => {
                    let key = Self::key(tenant, &edge.id.0.to_string());
                    wb.put_cf(self.cf(CF_EDGES)?, key, bincode::serialize(edge)?);
                }
                WriteOp::DeleteEdge(id) => {
                    wb.delete_cf(self.cf(CF_EDGES)?, Self::key(tenant, &id.0.to_string()));
                }
                WriteOp::PutEmbedding(record) => {
                    let key = Self::key(tenant, &Self::embedding_id(&record.target));
                    wb.put_cf(self.cf(CF_EMBEDDINGS)?, key, bincode::serialize(record)?);
                }
                WriteOp::DeleteEmbedding(target) => {
                    let key = Self::key(tenant, &Self::embedding_id(target));
                    wb.delete_cf(self.cf(CF_EMBEDDINGS)?, key);
                }
                WriteOp::PutSnapshot(snapshot) => {
                    let key = Self::key(tenant, &snapshot.id.0.to_string());
                    let payload = Self::compress(&bincode::serialize(snapshot.as_ref())?)?;
                    wb.put_cf(self.cf(CF_SNAPSHOTS)?, key, payload);
                }
                WriteOp::DeleteSnapshot(id) => {
                    wb.delete_cf(self.cf(CF_SNAPSHOTS)?, Self::key(tenant, &id.0.to_string()));
                }
                WriteOp::AppendAudit(entry) => {
                    let key = Self::key(tenant, &format!("{:020}", entry.sequence));
                    wb.put_cf(self.cf(CF_AUDIT)?, key, serde_json::to_vec(entry)?);
                }
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.db.write_opt(wb, &write_opts)?;
        debug!(tenant = %tenant, ops = batch.len(), "Wrote batch");
        Ok(())
    }

    fn load_all(&self) -> StorageResult<Vec<TenantImage>> {
        let mut images: BTreeMap<TenantId, TenantImage> = BTreeMap::new();
        fn image<'a>(images: &'a mut BTreeMap<TenantId, TenantImage>, tenant: TenantId) -> &'a mut TenantImage {
            images
                .entry(tenant.clone())
                .or_insert_with(|| TenantImage::empty(tenant))
        }

        self.scan(CF_NODES, |tenant, value| {
            let node: IntelligenceNode = bincode::deserialize(value)?;
            image(&mut images, tenant).nodes.push(node);
            Ok(())
        })?;
        self.scan(CF_EDGES, |tenant, value| {
            let edge: IntelligenceEdge = bincode::deserialize(value)?;
            image(&mut images, tenant).edges.push(edge);
            Ok(())
        })?;
        self.scan(CF_EMBEDDINGS, |tenant, value| {
            let record: EmbeddingRecord = bincode::deserialize(value)?;
            image(&mut images, tenant).embeddings.push(record);
            Ok(())
        })?;
        self.scan(CF_SNAPSHOTS, |tenant, value| {
            let snapshot: GraphSnapshot = bincode::deserialize(&Self::decompress(value)?)?;
            image(&mut images, tenant).snapshots.push(snapshot);
            Ok(())
        })?;
        self.scan(CF_AUDIT, |tenant, value| {
            let entry: AuditLogEntry = serde_json::from_slice(value)?;
            image(&mut images, tenant).audit.push(entry);
            Ok(())
        })?;

        info!(tenants = images.len(), "Loaded persisted tenants");
        Ok(images.into_values().collect())
    }

    fn name(&self) -> &'static str {
        "rocksdb"
    }
}
