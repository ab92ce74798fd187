//! Core domain types used by the chain
//!
//! This module defines strongly-typed hashes, public keys and addresses
//! that are shared across the state machine, together with the ledger
//! records (accounts, proposals, discussions), the transaction envelope
//! and the event taxonomy. The goal is to avoid "naked" byte buffers in
//! public APIs and instead use domain-specific newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Ledger account records.
pub mod account;
/// Typed block events and their key/value encoding.
pub mod event;
/// Proposal and discussion records.
pub mod proposal;
/// Transaction envelope, payloads and the wire codec.
pub mod tx;

pub use account::{Account, START_ACCOUNT_INDEX};
pub use event::{
    Event, EventAttribute, EventDiscussion, EventGrant, EventProposal, EventSettleProposal,
    EventUnStake, EventUpdateValidators, ValidatorUpdate,
};
pub use proposal::{Discussion, Proposal, ProposalStatus};
pub use tx::{
    DiscussionTx, GrantSt, GrantTx, HacTx, ProposalTx, RetractTx, SettleProposalTx, TxError,
    TxPayload, TxType, VoteCode,
};

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Length in bytes of an Ed25519 public key.
pub const PUBKEY_LEN: usize = 32;

/// Length in bytes of an account address.
pub const ADDRESS_LEN: usize = 20;

/// Strongly-typed 256-bit hash wrapper (BLAKE3-256).
///
/// Used for Merkle roots and the application hash reported to the
/// consensus engine.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// The all-zero hash, used as the root of an empty tree.
    pub const ZERO: Hash256 = Hash256([0u8; HASH_LEN]);

    /// Computes a new [`Hash256`] as the BLAKE3-256 hash of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let h = blake3::hash(data);
        Hash256(*h.as_bytes())
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Ed25519 public key bytes.
///
/// The key is carried as raw bytes; signature verification goes through
/// [`PublicKey::verify`], which rejects malformed points.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PublicKey(pub [u8; PUBKEY_LEN]);

impl PublicKey {
    /// Builds a public key from a byte slice of exactly [`PUBKEY_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; PUBKEY_LEN] = bytes.try_into().ok()?;
        Some(PublicKey(arr))
    }

    /// Whether the bytes decode to a point on the Ed25519 curve.
    pub fn is_valid(&self) -> bool {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0).is_ok()
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_LEN] {
        &self.0
    }

    /// Derives the account [`Address`] for this key.
    pub fn address(&self) -> Address {
        Address::from_public_key(self)
    }

    /// Hex encoding used as the validator-set key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verifies a detached Ed25519 signature over `msg`.
    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let Ok(sig) = ed25519_dalek::Signature::from_slice(sig) else {
            return false;
        };
        key.verify_strict(msg, &sig).is_ok()
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        PublicKey::from_slice(&bytes)
            .ok_or_else(|| serde::de::Error::custom("expected 32-byte ed25519 public key"))
    }
}

/// Account address: the first 20 bytes of SHA-256 over the public key.
///
/// This matches the address format the consensus engine uses for
/// validators, so commit signatures can be mapped back to accounts.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub fn from_public_key(pk: &PublicKey) -> Self {
        let digest = Sha256::digest(pk.as_bytes());
        let mut arr = [0u8; ADDRESS_LEN];
        arr.copy_from_slice(&digest[..ADDRESS_LEN]);
        Address(arr)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; ADDRESS_LEN] = bytes.try_into().ok()?;
        Some(Address(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

/// Serde helpers for byte fields carried as standard padded base64
/// strings. Records stored with bincode go through the same helpers.
pub(crate) mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }

    /// Same encoding for a list of byte strings (signature lists).
    pub mod list {
        use base64::Engine;
        use base64::engine::general_purpose::STANDARD;
        use serde::{Deserialize, Deserializer, Serializer, ser::SerializeSeq};

        pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(items.len()))?;
            for item in items {
                seq.serialize_element(&STANDARD.encode(item))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Vec<u8>>, D::Error> {
            let items = Vec::<String>::deserialize(deserializer)?;
            items
                .iter()
                .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    #[test]
    fn address_is_truncated_sha256_of_pubkey() {
        let pk = PublicKey([7u8; PUBKEY_LEN]);
        let digest = Sha256::digest(pk.as_bytes());

        assert_eq!(pk.address().as_bytes(), &digest[..ADDRESS_LEN]);
        assert_eq!(pk.address().to_string().len(), ADDRESS_LEN * 2);
    }

    #[test]
    fn public_key_verifies_own_signature_only() {
        let sk = SigningKey::from_bytes(&[9u8; 32]);
        let pk = PublicKey(sk.verifying_key().to_bytes());
        let sig = sk.sign(b"payload");

        assert!(pk.verify(b"payload", &sig.to_bytes()));
        assert!(!pk.verify(b"other", &sig.to_bytes()));
        assert!(!pk.verify(b"payload", &[0u8; 10]));
    }

    #[test]
    fn public_key_serializes_as_hex() {
        let pk = PublicKey([0xAB; PUBKEY_LEN]);
        let json = serde_json::to_string(&pk).expect("serialize pubkey");
        assert_eq!(json, format!("\"{}\"", "ab".repeat(PUBKEY_LEN)));

        let back: PublicKey = serde_json::from_str(&json).expect("deserialize pubkey");
        assert_eq!(back, pk);
        assert!(serde_json::from_str::<PublicKey>("\"abcd\"").is_err());
    }
}
