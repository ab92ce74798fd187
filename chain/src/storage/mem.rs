//! In-memory store backend.
//!
//! Useful for tests and ephemeral devnets. Saved versions live only as
//! long as the process.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use super::{StorageError, StoreBackend, VersionBatch};
use crate::types::Hash256;

#[derive(Debug, Default)]
pub struct MemBackend {
    latest: Option<(u64, Hash256)>,
    roots: BTreeMap<u64, Hash256>,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    nodes: HashMap<Hash256, Vec<u8>>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemBackend {
    fn latest(&self) -> Result<Option<(u64, Hash256)>, StorageError> {
        Ok(self.latest)
    }

    fn root_at(&self, version: u64) -> Result<Option<Hash256>, StorageError> {
        Ok(self.roots.get(&version).copied())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn range(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let bounds = (
            Bound::Included(start),
            end.map_or(Bound::Unbounded, Bound::Excluded),
        );
        Ok(self
            .entries
            .range::<[u8], _>(bounds)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn node(&self, hash: &Hash256) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.nodes.get(hash).cloned())
    }

    fn save(&mut self, batch: &VersionBatch<'_>) -> Result<(), StorageError> {
        self.entries
            .extend(batch.changes.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.nodes.extend(batch.nodes.iter().cloned());
        self.roots.insert(batch.version, batch.root);
        self.latest = Some((batch.version, batch.root));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_backend_accumulates_versions() {
        let mut backend = MemBackend::new();
        assert!(backend.latest().expect("latest").is_none());

        let mut changes = BTreeMap::new();
        changes.insert(b"a".to_vec(), b"1".to_vec());
        backend
            .save(&VersionBatch {
                version: 1,
                root: Hash256([1u8; 32]),
                changes: &changes,
                nodes: vec![(Hash256([1u8; 32]), b"n1".to_vec())],
            })
            .expect("save v1");

        let mut changes = BTreeMap::new();
        changes.insert(b"b".to_vec(), b"2".to_vec());
        backend
            .save(&VersionBatch {
                version: 2,
                root: Hash256([2u8; 32]),
                changes: &changes,
                nodes: Vec::new(),
            })
            .expect("save v2");

        assert_eq!(backend.latest().unwrap(), Some((2, Hash256([2u8; 32]))));
        assert_eq!(backend.root_at(1).unwrap(), Some(Hash256([1u8; 32])));
        assert_eq!(backend.range(b"", None).unwrap().len(), 2);
        assert_eq!(backend.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.node(&Hash256([1u8; 32])).unwrap(), Some(b"n1".to_vec()));
    }
}
