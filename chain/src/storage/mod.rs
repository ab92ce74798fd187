//! Storage layer for chain state.
//!
//! State lives in a versioned key/value store ([`MerkleStore`]) whose
//! root commits to every entry. Saved versions are persisted through a
//! [`StoreBackend`]:
//!
//! - an in-memory backend ([`mem::MemBackend`]) suitable for tests,
//! - a RocksDB-backed backend ([`rocksdb::RocksDbBackend`]) for persistent
//!   nodes.
//!
//! A backend keeps two things per store: an ordered index holding the
//! latest value of every key, and the content-addressed trie nodes of
//! every saved version together with each version's root.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::types::Hash256;

pub mod mem;
pub mod merkle;
pub mod rocksdb;

pub use mem::MemBackend;
pub use merkle::MerkleStore;
pub use rocksdb::{RocksDbBackend, RocksDbConfig};

/// Storage-level error type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying RocksDB error.
    #[error("rocksdb: {0}")]
    RocksDb(#[from] ::rocksdb::Error),

    /// Required column family was not found.
    #[error("missing column family {0}")]
    MissingColumnFamily(&'static str),

    /// Corrupted or malformed metadata (e.g. root hash with wrong length).
    #[error("corrupted metadata: {0}")]
    CorruptedMeta(&'static str),

    /// Backend refused the write.
    #[error("backend write failed: {0}")]
    Backend(String),

    /// The version was never saved, or is ahead of the store.
    #[error("unknown version {0}")]
    UnknownVersion(u64),

    /// Range reads are served for the latest version only.
    #[error("range read at a past version")]
    HistoricalRange,
}

/// One saved version as handed to a backend.
#[derive(Debug)]
pub struct VersionBatch<'a> {
    pub version: u64,
    pub root: Hash256,
    /// Entries written since the previous version.
    pub changes: &'a BTreeMap<Vec<u8>, Vec<u8>>,
    /// Trie nodes first reachable from `root`, with their encodings.
    pub nodes: Vec<(Hash256, Vec<u8>)>,
}

/// Durable home of saved versions.
///
/// Each `save` is atomic: either the whole batch plus the new version and
/// root are written, or nothing is.
pub trait StoreBackend: Send + Sync {
    /// Latest saved version and its root, or `None` for a fresh store.
    fn latest(&self) -> Result<Option<(u64, Hash256)>, StorageError>;

    /// Root of a saved version.
    fn root_at(&self, version: u64) -> Result<Option<Hash256>, StorageError>;

    /// Latest saved value of `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Latest saved entries with `start <= key < end`, in key order.
    fn range(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Encoded trie node by hash.
    fn node(&self, hash: &Hash256) -> Result<Option<Vec<u8>>, StorageError>;

    fn save(&mut self, batch: &VersionBatch<'_>) -> Result<(), StorageError>;
}
