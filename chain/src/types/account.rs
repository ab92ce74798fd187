//! Account records stored in chain state.
//!
//! An account is created either at genesis (one per initial validator) or
//! by an accepted grant. Its index and address never change afterwards;
//! stake and nonce are mutated by transactions.

use serde::{Deserialize, Serialize};

use super::{Address, PublicKey};

/// First index handed out to accounts. Lower indices are never assigned.
pub const START_ACCOUNT_INDEX: u64 = 65536;

/// Account stored under its index in the account store.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Sequential identifier assigned by the state at creation time.
    pub index: u64,

    /// Ed25519 key that signs this account's transactions.
    #[serde(rename = "pubKey")]
    pub pub_key: PublicKey,

    /// Bonded stake in base units. Zero means the account is no longer a
    /// member and cannot act.
    pub stake: u64,

    /// Number of transactions applied for this account.
    pub nonce: u64,

    /// Endpoint of the agent that votes on behalf of this member.
    #[serde(rename = "agentUrl", default)]
    pub agent_url: String,

    /// Display name of the member.
    #[serde(default)]
    pub name: String,
}

impl Account {
    /// Creates a fresh, not-yet-indexed account.
    pub fn new(pub_key: PublicKey, stake: u64) -> Self {
        Self {
            index: 0,
            pub_key,
            stake,
            nonce: 0,
            agent_url: String::new(),
            name: String::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.pub_key.address()
    }

    /// Verifies a transaction signature list against this account's key.
    ///
    /// Exactly one signature is accepted.
    pub fn verify(&self, msg: &[u8], sigs: &[Vec<u8>]) -> bool {
        match sigs {
            [sig] => self.pub_key.verify(msg, sig),
            _ => false,
        }
    }

    pub fn is_member(&self) -> bool {
        self.stake > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    #[test]
    fn verify_requires_exactly_one_signature() {
        let sk = SigningKey::from_bytes(&[1u8; 32]);
        let acnt = Account::new(PublicKey(sk.verifying_key().to_bytes()), 10);
        let sig = sk.sign(b"msg").to_bytes().to_vec();

        assert!(acnt.verify(b"msg", std::slice::from_ref(&sig)));
        assert!(!acnt.verify(b"msg", &[]));
        assert!(!acnt.verify(b"msg", &[sig.clone(), sig]));
    }

    #[test]
    fn json_uses_wire_field_names() {
        let mut acnt = Account::new(PublicKey([2u8; 32]), 1_000);
        acnt.index = START_ACCOUNT_INDEX;
        acnt.agent_url = "http://agent".to_string();

        let json = serde_json::to_value(&acnt).expect("serialize account");
        assert_eq!(json["index"], 65536);
        assert_eq!(json["stake"], 1_000);
        assert_eq!(json["agentUrl"], "http://agent");
        assert!(json["pubKey"].is_string());
    }
}
