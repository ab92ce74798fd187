//! RocksDB-backed store backend.
//!
//! Saved versions are persisted in a RocksDB instance with dedicated
//! column families:
//!
//! - `"state"`: every state key -> value of the latest version,
//! - `"nodes"`: trie node hash -> node encoding, for every version,
//! - `"roots"`: BE u64 version -> Merkle root,
//! - `"meta"`:  the latest version number under `"version"` and its
//!   Merkle root under `"root"`.
//!
//! Each version is written as a single atomic batch. Nothing is read
//! eagerly on open.

use std::path::Path;

use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{StorageError, StoreBackend, VersionBatch};
use crate::types::{HASH_LEN, Hash256};

const CF_STATE: &str = "state";
const CF_META: &str = "meta";
const CF_NODES: &str = "nodes";
const CF_ROOTS: &str = "roots";
const META_VERSION: &[u8] = b"version";
const META_ROOT: &[u8] = b"root";

/// Configuration for [`RocksDbBackend`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/hac-state".to_string(),
            create_if_missing: true,
        }
    }
}

/// RocksDB-backed implementation of [`StoreBackend`].
pub struct RocksDbBackend {
    db: DB,
}

impl RocksDbBackend {
    /// Opens (or creates) the database at the configured path.
    ///
    /// This sets up the `"state"`, `"nodes"`, `"roots"` and `"meta"`
    /// column families. The `"default"` column family is also created to
    /// keep RocksDB happy, but it is not used.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_STATE, Options::default()),
            ColumnFamilyDescriptor::new(CF_NODES, Options::default()),
            ColumnFamilyDescriptor::new(CF_ROOTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self { db })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    fn read_hash(&self, cf: &'static str, key: &[u8]) -> Result<Option<Hash256>, StorageError> {
        let Some(bytes) = self.db.get_cf(self.cf(cf)?, key)? else {
            return Ok(None);
        };
        let arr: [u8; HASH_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StorageError::CorruptedMeta("root hash length"))?;
        Ok(Some(Hash256(arr)))
    }
}

impl StoreBackend for RocksDbBackend {
    fn latest(&self) -> Result<Option<(u64, Hash256)>, StorageError> {
        let Some(bytes) = self.db.get_cf(self.cf(CF_META)?, META_VERSION)? else {
            return Ok(None);
        };
        let arr: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StorageError::CorruptedMeta("version length"))?;
        let root = self
            .read_hash(CF_META, META_ROOT)?
            .ok_or(StorageError::CorruptedMeta("missing root"))?;
        Ok(Some((u64::from_be_bytes(arr), root)))
    }

    fn root_at(&self, version: u64) -> Result<Option<Hash256>, StorageError> {
        self.read_hash(CF_ROOTS, &version.to_be_bytes())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get_cf(self.cf(CF_STATE)?, key)?)
    }

    fn range(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf_state = self.cf(CF_STATE)?;
        let mut out = Vec::new();
        for item in self
            .db
            .iterator_cf(cf_state, IteratorMode::From(start, Direction::Forward))
        {
            let (k, v) = item?;
            if end.is_some_and(|end| &*k >= end) {
                break;
            }
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    fn node(&self, hash: &Hash256) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get_cf(self.cf(CF_NODES)?, hash.as_bytes())?)
    }

    fn save(&mut self, batch: &VersionBatch<'_>) -> Result<(), StorageError> {
        let cf_state = self.cf(CF_STATE)?;
        let cf_nodes = self.cf(CF_NODES)?;
        let cf_roots = self.cf(CF_ROOTS)?;
        let cf_meta = self.cf(CF_META)?;

        let mut wb = WriteBatch::default();
        for (k, v) in batch.changes {
            wb.put_cf(cf_state, k, v);
        }
        for (hash, bytes) in &batch.nodes {
            wb.put_cf(cf_nodes, hash.as_bytes(), bytes);
        }
        wb.put_cf(cf_roots, batch.version.to_be_bytes(), batch.root.as_bytes());
        wb.put_cf(cf_meta, META_VERSION, batch.version.to_be_bytes());
        wb.put_cf(cf_meta, META_ROOT, batch.root.as_bytes());
        self.db.write(wb)?;

        debug!(
            version = batch.version,
            changed = batch.changes.len(),
            nodes = batch.nodes.len(),
            "rocksdb version written"
        );
        Ok(())
    }
}
