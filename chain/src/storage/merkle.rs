//! Versioned key/value store with a binary Merkle trie root.
//!
//! Writes accumulate in a pending layer on top of the last saved version.
//! `save_version` hands them to the backend together with the trie nodes
//! they created; `rollback` drops them. Nothing is preloaded: reads miss
//! through to the backend.
//!
//! Trie layout:
//!
//! - a key sits on the path given by the bits of `BLAKE3(key)`, most
//!   significant bit first, at the shallowest depth where no other key
//!   shares its prefix,
//! - leaf: `BLAKE3(0x00 || len(key) as u64 BE || key || value)`,
//! - branch: `BLAKE3(0x01 || left || right)`,
//! - an empty subtree hashes to all zeroes.
//!
//! The node encoding is the hash preimage, so nodes are stored by the hash
//! of their own bytes. A new version writes only the nodes on changed
//! paths; older versions stay readable through their roots.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use tracing::{debug, info};

use super::{StorageError, StoreBackend, VersionBatch};
use crate::types::{HASH_LEN, Hash256};

const TAG_LEAF: u8 = 0x00;
const TAG_BRANCH: u8 = 0x01;
const PATH_BITS: usize = HASH_LEN * 8;

type KeyPath = [u8; HASH_LEN];

fn key_path(key: &[u8]) -> KeyPath {
    *blake3::hash(key).as_bytes()
}

fn bit(path: &KeyPath, depth: usize) -> u8 {
    (path[depth / 8] >> (7 - depth % 8)) & 1
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Node {
    Leaf { key: Vec<u8>, value: Vec<u8> },
    Branch { left: Hash256, right: Hash256 },
}

impl Node {
    fn encode(&self) -> Vec<u8> {
        match self {
            Node::Leaf { key, value } => {
                let mut out = Vec::with_capacity(9 + key.len() + value.len());
                out.push(TAG_LEAF);
                out.extend_from_slice(&(key.len() as u64).to_be_bytes());
                out.extend_from_slice(key);
                out.extend_from_slice(value);
                out
            }
            Node::Branch { left, right } => {
                let mut out = Vec::with_capacity(1 + 2 * HASH_LEN);
                out.push(TAG_BRANCH);
                out.extend_from_slice(left.as_bytes());
                out.extend_from_slice(right.as_bytes());
                out
            }
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        let malformed = StorageError::CorruptedMeta("malformed trie node");
        let (tag, body) = bytes.split_first().ok_or(StorageError::CorruptedMeta("empty trie node"))?;
        match *tag {
            TAG_LEAF => {
                let (len, rest) = body.split_first_chunk::<8>().ok_or(malformed)?;
                let len = usize::try_from(u64::from_be_bytes(*len))
                    .map_err(|_| StorageError::CorruptedMeta("trie key length"))?;
                if rest.len() < len {
                    return Err(StorageError::CorruptedMeta("trie key length"));
                }
                let (key, value) = rest.split_at(len);
                Ok(Node::Leaf {
                    key: key.to_vec(),
                    value: value.to_vec(),
                })
            }
            TAG_BRANCH if body.len() == 2 * HASH_LEN => {
                let mut left = [0u8; HASH_LEN];
                let mut right = [0u8; HASH_LEN];
                left.copy_from_slice(&body[..HASH_LEN]);
                right.copy_from_slice(&body[HASH_LEN..]);
                Ok(Node::Branch {
                    left: Hash256(left),
                    right: Hash256(right),
                })
            }
            _ => Err(malformed),
        }
    }
}

pub struct MerkleStore {
    backend: Box<dyn StoreBackend>,
    pending: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Pending writes not yet folded into `working_root`.
    unhashed: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Nodes created since the last save, by hash.
    fresh: HashMap<Hash256, Node>,
    working_root: Hash256,
    version: u64,
    root: Hash256,
}

impl MerkleStore {
    /// Opens the store at the latest version the backend holds.
    pub fn open(backend: Box<dyn StoreBackend>) -> Result<Self, StorageError> {
        let (version, root) = backend.latest()?.unwrap_or((0, Hash256::ZERO));
        if !root.is_zero() && backend.node(&root)?.is_none() {
            return Err(StorageError::CorruptedMeta("missing root node"));
        }
        info!(version, root = %root, "state store opened");
        Ok(Self {
            backend,
            pending: BTreeMap::new(),
            unhashed: BTreeMap::new(),
            fresh: HashMap::new(),
            working_root: root,
            version,
            root,
        })
    }

    /// Working view: pending writes over the last saved version.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        match self.pending.get(key) {
            Some(value) => Ok(Some(value.clone())),
            None => self.backend.get(key),
        }
    }

    /// Last saved version only.
    pub fn get_committed(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.backend.get(key)
    }

    /// Value of `key` as of saved `version`.
    pub fn get_at(&self, version: u64, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if version == self.version {
            return self.backend.get(key);
        }
        let path = key_path(key);
        let mut at = self.root_at(version)?;
        let mut depth = 0;
        while !at.is_zero() {
            match self.node(&at)? {
                Node::Leaf { key: k, value } => return Ok((k == key).then_some(value)),
                Node::Branch { left, right } => {
                    at = if bit(&path, depth) == 0 { left } else { right };
                    depth += 1;
                }
            }
        }
        Ok(None)
    }

    /// Root of saved `version`. Version zero is the empty store.
    pub fn root_at(&self, version: u64) -> Result<Hash256, StorageError> {
        if version > self.version {
            return Err(StorageError::UnknownVersion(version));
        }
        if version == self.version {
            return Ok(self.root);
        }
        if version == 0 {
            return Ok(Hash256::ZERO);
        }
        self.backend
            .root_at(version)?
            .ok_or(StorageError::UnknownVersion(version))
    }

    /// Writes `value` under `key`. Returns true if the key was new.
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<bool, StorageError> {
        let is_new = self.get(&key)?.is_none();
        self.unhashed.insert(key.clone(), value.clone());
        self.pending.insert(key, value);
        Ok(is_new)
    }

    /// Ordered entries of the working view with `start <= key < end`.
    ///
    /// `end = None` means unbounded.
    pub fn iterate(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut out: BTreeMap<Vec<u8>, Vec<u8>> =
            self.backend.range(start, end)?.into_iter().collect();
        let bounds = (
            Bound::Included(start),
            end.map_or(Bound::Unbounded, Bound::Excluded),
        );
        out.extend(
            self.pending
                .range::<[u8], _>(bounds)
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Ok(out.into_iter().collect())
    }

    /// Same as [`MerkleStore::iterate`] over the last saved version.
    pub fn iterate_committed(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        self.backend.range(start, end)
    }

    fn node(&self, hash: &Hash256) -> Result<Node, StorageError> {
        if let Some(node) = self.fresh.get(hash) {
            return Ok(node.clone());
        }
        let bytes = self
            .backend
            .node(hash)?
            .ok_or(StorageError::CorruptedMeta("missing trie node"))?;
        Node::decode(&bytes)
    }

    fn put(&mut self, node: Node) -> Hash256 {
        let hash = Hash256::compute(&node.encode());
        self.fresh.insert(hash, node);
        hash
    }

    fn insert(
        &mut self,
        at: Hash256,
        depth: usize,
        path: &KeyPath,
        key: &[u8],
        value: &[u8],
    ) -> Result<Hash256, StorageError> {
        let leaf = Node::Leaf {
            key: key.to_vec(),
            value: value.to_vec(),
        };
        if at.is_zero() {
            return Ok(self.put(leaf));
        }
        match self.node(&at)? {
            Node::Leaf { key: k, .. } if k == key => Ok(self.put(leaf)),
            Node::Leaf { key: k, .. } => {
                let other = key_path(&k);
                let new = self.put(leaf);
                self.join(depth, (at, other), (new, *path))
            }
            Node::Branch { left, right } => {
                let node = if bit(path, depth) == 0 {
                    Node::Branch {
                        left: self.insert(left, depth + 1, path, key, value)?,
                        right,
                    }
                } else {
                    Node::Branch {
                        left,
                        right: self.insert(right, depth + 1, path, key, value)?,
                    }
                };
                Ok(self.put(node))
            }
        }
    }

    /// Smallest subtree at `depth` holding two leaves.
    fn join(
        &mut self,
        depth: usize,
        a: (Hash256, KeyPath),
        b: (Hash256, KeyPath),
    ) -> Result<Hash256, StorageError> {
        if depth >= PATH_BITS {
            return Err(StorageError::CorruptedMeta("key path collision"));
        }
        let side = bit(&a.1, depth);
        let node = if side != bit(&b.1, depth) {
            let (left, right) = if side == 0 { (a.0, b.0) } else { (b.0, a.0) };
            Node::Branch { left, right }
        } else {
            let child = self.join(depth + 1, a, b)?;
            if side == 0 {
                Node::Branch {
                    left: child,
                    right: Hash256::ZERO,
                }
            } else {
                Node::Branch {
                    left: Hash256::ZERO,
                    right: child,
                }
            }
        };
        Ok(self.put(node))
    }

    /// Root over the working view.
    ///
    /// Only writes made since the previous call are folded in, each along
    /// its own path.
    pub fn working_hash(&mut self) -> Result<Hash256, StorageError> {
        let unhashed = std::mem::take(&mut self.unhashed);
        let mut root = self.working_root;
        for (key, value) in &unhashed {
            root = self.insert(root, 0, &key_path(key), key, value)?;
        }
        self.working_root = root;
        Ok(root)
    }

    /// Encodings of the fresh nodes reachable from `root`.
    fn fresh_nodes(&self, root: Hash256) -> Vec<(Hash256, Vec<u8>)> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(hash) = stack.pop() {
            let Some(node) = self.fresh.get(&hash) else {
                continue;
            };
            if let Node::Branch { left, right } = node {
                stack.push(*left);
                stack.push(*right);
            }
            out.push((hash, node.encode()));
        }
        out
    }

    /// Commits pending writes as a new immutable version.
    ///
    /// On failure the pending writes are dropped and the store is left at
    /// the previous version.
    pub fn save_version(&mut self) -> Result<(Hash256, u64), StorageError> {
        let root = match self.working_hash() {
            Ok(root) => root,
            Err(e) => {
                self.rollback();
                return Err(e);
            }
        };
        let version = self.version + 1;
        let batch = VersionBatch {
            version,
            root,
            changes: &self.pending,
            nodes: self.fresh_nodes(root),
        };
        let written = batch.nodes.len();
        if let Err(e) = self.backend.save(&batch) {
            self.rollback();
            return Err(e);
        }

        debug!(version, changed = self.pending.len(), nodes = written, root = %root, "state version saved");
        self.pending.clear();
        self.fresh.clear();
        self.version = version;
        self.root = root;
        Ok((root, version))
    }

    /// Drops all pending writes.
    pub fn rollback(&mut self) {
        if !self.pending.is_empty() {
            debug!(dropped = self.pending.len(), "rolling back pending writes");
        }
        self.pending.clear();
        self.unhashed.clear();
        self.fresh.clear();
        self.working_root = self.root;
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Root of the last saved version.
    pub fn root(&self) -> Hash256 {
        self.root
    }
}
