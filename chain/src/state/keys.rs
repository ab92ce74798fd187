//! Key layout of the state store.
//!
//! | key                       | value                    |
//! |---------------------------|--------------------------|
//! | `s`                       | state header             |
//! | `a` + BE u64 index        | account body             |
//! | `i` + 20-byte address     | BE u64 account index     |
//! | `p` + BE u64 index        | proposal body            |
//! | `pi`                      | BE u64 proposal counter  |
//! | `d` + BE u64 index        | discussion body          |
//! | `di`                      | BE u64 discussion counter|

use crate::types::Address;

pub const KEY_STATE: &[u8] = b"s";
pub const KEY_PROPOSAL_INDEX: &[u8] = b"pi";
pub const KEY_DISCUSSION_INDEX: &[u8] = b"di";

pub const PREFIX_ACCOUNT_BODY: u8 = b'a';
pub const PREFIX_ACCOUNT_INDEX: u8 = b'i';
pub const PREFIX_PROPOSAL_BODY: u8 = b'p';
pub const PREFIX_DISCUSSION_BODY: u8 = b'd';

fn indexed(prefix: u8, idx: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(prefix);
    key.extend_from_slice(&idx.to_be_bytes());
    key
}

pub fn account_body(idx: u64) -> Vec<u8> {
    indexed(PREFIX_ACCOUNT_BODY, idx)
}

pub fn account_index(addr: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + addr.as_bytes().len());
    key.push(PREFIX_ACCOUNT_INDEX);
    key.extend_from_slice(addr.as_bytes());
    key
}

pub fn proposal_body(idx: u64) -> Vec<u8> {
    indexed(PREFIX_PROPOSAL_BODY, idx)
}

pub fn discussion_body(idx: u64) -> Vec<u8> {
    indexed(PREFIX_DISCUSSION_BODY, idx)
}

/// Smallest key greater than every key starting with `prefix`, or `None`
/// when no such key exists (prefix is all `0xff`).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last != u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

pub fn encode_u64(v: u64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

/// Decodes a big-endian integer of up to eight bytes.
pub fn decode_u64(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}
