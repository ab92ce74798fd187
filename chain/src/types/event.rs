//! Block events emitted on finalization.
//!
//! Events are flat key/value attribute lists. Downstream indexers decode
//! them by attribute name, so the keys below are a stable schema.

use serde::{Deserialize, Serialize};

use super::PublicKey;

pub const EVENT_GRANT: &str = "grant";
pub const EVENT_PROPOSAL: &str = "proposal";
pub const EVENT_SETTLE_PROPOSAL: &str = "settle_proposal";
pub const EVENT_DISCUSSION: &str = "discussion";
pub const EVENT_RETRACT: &str = "retract";
pub const EVENT_UPDATE_VALIDATOR: &str = "update_validator";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
    /// Whether the consensus engine should index this attribute.
    pub index: bool,
}

impl EventAttribute {
    fn new(key: &str, value: impl ToString, index: bool) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            index,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    fn new(kind: &str, attributes: Vec<EventAttribute>) -> Self {
        Self {
            kind: kind.to_string(),
            attributes,
        }
    }

    /// Iterates attributes if this event has the given type.
    fn attrs_of(&self, kind: &str) -> Option<impl Iterator<Item = &EventAttribute>> {
        (self.kind == kind).then(|| self.attributes.iter())
    }
}

/// Validator power change reported to the consensus engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub pub_key: PublicKey,
    pub power: i64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EventProposal {
    pub proposal_index: u64,
    pub proposer: u64,
    pub proposer_address: String,
    pub end_height: u64,
    pub status: u64,
    pub data: Vec<u8>,
}

impl EventProposal {
    pub fn encode(&self) -> Event {
        Event::new(
            EVENT_PROPOSAL,
            vec![
                EventAttribute::new("proposal", self.proposal_index, true),
                EventAttribute::new("proposer", self.proposer, true),
                EventAttribute::new("endHeight", self.end_height, false),
                EventAttribute::new("status", self.status, false),
                EventAttribute::new("data", hex::encode(&self.data), false),
                EventAttribute::new("proposerAddress", &self.proposer_address, false),
            ],
        )
    }

    pub fn decode(event: &Event) -> Option<Self> {
        let mut out = Self::default();
        for attr in event.attrs_of(EVENT_PROPOSAL)? {
            match attr.key.as_str() {
                "proposal" => out.proposal_index = attr.value.parse().ok()?,
                "proposer" => out.proposer = attr.value.parse().ok()?,
                "endHeight" => out.end_height = attr.value.parse().ok()?,
                "status" => out.status = attr.value.parse().ok()?,
                "data" => out.data = hex::decode(&attr.value).ok()?,
                "proposerAddress" => out.proposer_address = attr.value.clone(),
                _ => {}
            }
        }
        Some(out)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EventSettleProposal {
    pub proposer: u64,
    pub proposal: u64,
    /// Final proposal status code.
    pub state: i64,
}

impl EventSettleProposal {
    pub fn encode(&self) -> Event {
        Event::new(
            EVENT_SETTLE_PROPOSAL,
            vec![
                EventAttribute::new("proposer", self.proposer, true),
                EventAttribute::new("proposal", self.proposal, true),
                EventAttribute::new("state", self.state, false),
            ],
        )
    }

    pub fn decode(event: &Event) -> Option<Self> {
        let mut out = Self::default();
        for attr in event.attrs_of(EVENT_SETTLE_PROPOSAL)? {
            match attr.key.as_str() {
                "proposer" => out.proposer = attr.value.parse().ok()?,
                "proposal" => out.proposal = attr.value.parse().ok()?,
                "state" => out.state = attr.value.parse().ok()?,
                _ => {}
            }
        }
        Some(out)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EventDiscussion {
    pub speaker: u64,
    pub speaker_address: String,
    pub proposal: u64,
    pub data: Vec<u8>,
}

impl EventDiscussion {
    pub fn encode(&self) -> Event {
        Event::new(
            EVENT_DISCUSSION,
            vec![
                EventAttribute::new("speaker", self.speaker, true),
                EventAttribute::new("address", &self.speaker_address, false),
                EventAttribute::new("proposal", self.proposal, true),
                EventAttribute::new("data", hex::encode(&self.data), false),
            ],
        )
    }

    pub fn decode(event: &Event) -> Option<Self> {
        let mut out = Self::default();
        for attr in event.attrs_of(EVENT_DISCUSSION)? {
            match attr.key.as_str() {
                "speaker" => out.speaker = attr.value.parse().ok()?,
                "address" => out.speaker_address = attr.value.clone(),
                "proposal" => out.proposal = attr.value.parse().ok()?,
                "data" => out.data = hex::decode(&attr.value).ok()?,
                _ => {}
            }
        }
        Some(out)
    }
}

/// Outcome of a membership grant.
///
/// `validator` is the index consumed by the grant. It names the new
/// account when `grant` is true and identifies the rejected grant
/// otherwise.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EventGrant {
    pub validator: u64,
    pub address: String,
    pub amount: u64,
    pub agent_url: String,
    pub nonce: u64,
    pub grant: bool,
    pub proposer_index: u64,
    pub proposer_address: String,
}

impl EventGrant {
    pub fn encode(&self) -> Event {
        Event::new(
            EVENT_GRANT,
            vec![
                EventAttribute::new("validator", self.validator, true),
                EventAttribute::new("addr", &self.address, false),
                EventAttribute::new("amount", self.amount, false),
                EventAttribute::new("nonce", self.nonce, false),
                EventAttribute::new("grant", self.grant, false),
                EventAttribute::new("proposer", self.proposer_index, false),
                EventAttribute::new("proposerAddress", &self.proposer_address, false),
                EventAttribute::new("agentUrl", &self.agent_url, false),
            ],
        )
    }

    pub fn decode(event: &Event) -> Option<Self> {
        let mut out = Self::default();
        for attr in event.attrs_of(EVENT_GRANT)? {
            match attr.key.as_str() {
                "validator" => out.validator = attr.value.parse().ok()?,
                "addr" => out.address = attr.value.clone(),
                "amount" => out.amount = attr.value.parse().ok()?,
                "nonce" => out.nonce = attr.value.parse().ok()?,
                "grant" => out.grant = attr.value.parse().ok()?,
                "proposer" => out.proposer_index = attr.value.parse().ok()?,
                "proposerAddress" => out.proposer_address = attr.value.clone(),
                "agentUrl" => out.agent_url = attr.value.clone(),
                _ => {}
            }
        }
        Some(out)
    }
}

/// Full stake retraction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EventUnStake {
    pub validator: u64,
    pub address: String,
    pub amount: u64,
}

impl EventUnStake {
    pub fn encode(&self) -> Event {
        Event::new(
            EVENT_RETRACT,
            vec![
                EventAttribute::new("validator", self.validator, true),
                EventAttribute::new("amount", self.amount, false),
                EventAttribute::new("addr", &self.address, false),
            ],
        )
    }

    pub fn decode(event: &Event) -> Option<Self> {
        let mut out = Self::default();
        for attr in event.attrs_of(EVENT_RETRACT)? {
            match attr.key.as_str() {
                "validator" => out.validator = attr.value.parse().ok()?,
                "amount" => out.amount = attr.value.parse().ok()?,
                "addr" => out.address = attr.value.clone(),
                _ => {}
            }
        }
        Some(out)
    }
}

/// Validator set changes, encoded as two parallel comma-joined lists.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EventUpdateValidators {
    pub updates: Vec<ValidatorUpdate>,
}

impl EventUpdateValidators {
    pub fn encode(&self) -> Event {
        let pks: Vec<String> = self.updates.iter().map(|u| u.pub_key.to_hex()).collect();
        let powers: Vec<String> = self.updates.iter().map(|u| u.power.to_string()).collect();
        Event::new(
            EVENT_UPDATE_VALIDATOR,
            vec![
                EventAttribute::new("pks", pks.join(","), false),
                EventAttribute::new("powers", powers.join(","), false),
            ],
        )
    }

    pub fn decode(event: &Event) -> Option<Self> {
        let mut pks: Vec<PublicKey> = Vec::new();
        let mut powers: Vec<i64> = Vec::new();
        for attr in event.attrs_of(EVENT_UPDATE_VALIDATOR)? {
            match attr.key.as_str() {
                "pks" if !attr.value.is_empty() => {
                    pks = attr
                        .value
                        .split(',')
                        .map(|s| hex::decode(s).ok().and_then(|b| PublicKey::from_slice(&b)))
                        .collect::<Option<_>>()?;
                }
                "powers" if !attr.value.is_empty() => {
                    powers = attr
                        .value
                        .split(',')
                        .map(|s| s.parse().ok())
                        .collect::<Option<_>>()?;
                }
                _ => {}
            }
        }
        if pks.len() != powers.len() {
            return None;
        }
        let updates = pks
            .into_iter()
            .zip(powers)
            .map(|(pub_key, power)| ValidatorUpdate { pub_key, power })
            .collect();
        Some(Self { updates })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr<'a>(event: &'a Event, key: &str) -> &'a EventAttribute {
        event
            .attributes
            .iter()
            .find(|a| a.key == key)
            .unwrap_or_else(|| panic!("missing attribute {key}"))
    }

    #[test]
    fn proposal_event_schema() {
        let ev = EventProposal {
            proposal_index: 1,
            proposer: 65536,
            proposer_address: "ABCD".to_string(),
            end_height: 20,
            status: 2,
            data: b"D".to_vec(),
        };
        let encoded = ev.encode();

        assert_eq!(encoded.kind, "proposal");
        let keys: Vec<&str> = encoded.attributes.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(
            keys,
            ["proposal", "proposer", "endHeight", "status", "data", "proposerAddress"]
        );
        assert!(attr(&encoded, "proposal").index);
        assert!(!attr(&encoded, "status").index);
        assert_eq!(EventProposal::decode(&encoded), Some(ev));
    }

    #[test]
    fn opaque_data_survives_as_hex() {
        let ev = EventDiscussion {
            speaker: 65537,
            speaker_address: "AB".to_string(),
            proposal: 3,
            data: vec![0xff, 0xfe, 0x00, 0x80],
        };
        let encoded = ev.encode();
        assert_eq!(attr(&encoded, "data").value, "fffe0080");
        assert_eq!(EventDiscussion::decode(&encoded), Some(ev));

        let prop = EventProposal {
            data: vec![0xc3, 0x28],
            ..EventProposal::default()
        };
        assert_eq!(EventProposal::decode(&prop.encode()), Some(prop));

        let mut broken = encoded;
        broken.attributes[3].value = "not hex".to_string();
        assert!(EventDiscussion::decode(&broken).is_none());
    }

    #[test]
    fn grant_event_carries_outcome() {
        let ev = EventGrant {
            validator: 65537,
            address: "AA".to_string(),
            amount: 5,
            agent_url: "http://agent".to_string(),
            nonce: 0,
            grant: false,
            proposer_index: 65536,
            proposer_address: "BB".to_string(),
        };
        let encoded = ev.encode();
        assert_eq!(attr(&encoded, "grant").value, "false");
        assert_eq!(EventGrant::decode(&encoded), Some(ev));
    }

    #[test]
    fn decode_rejects_malformed_numbers_and_wrong_type() {
        let mut encoded = EventUnStake {
            validator: 1,
            address: "A".to_string(),
            amount: 3,
        }
        .encode();
        assert!(EventSettleProposal::decode(&encoded).is_none());

        encoded.attributes[1].value = "lots".to_string();
        assert!(EventUnStake::decode(&encoded).is_none());
    }

    #[test]
    fn update_validators_lists_are_parallel() {
        let ev = EventUpdateValidators {
            updates: vec![
                ValidatorUpdate {
                    pub_key: PublicKey([1u8; 32]),
                    power: 10,
                },
                ValidatorUpdate {
                    pub_key: PublicKey([2u8; 32]),
                    power: 0,
                },
            ],
        };
        let encoded = ev.encode();
        assert_eq!(attr(&encoded, "powers").value, "10,0");
        assert_eq!(EventUpdateValidators::decode(&encoded), Some(ev));

        let mut broken = encoded.clone();
        broken.attributes[1].value = "10".to_string();
        assert!(EventUpdateValidators::decode(&broken).is_none());
    }
}
