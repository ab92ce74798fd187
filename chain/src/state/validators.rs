//! Validator selection from stake.
//!
//! Power is `stake / units_per_power(height)`. The active set is the top
//! [`MAX_VALIDATORS`] accounts by power, ties broken by ascending account
//! index, selected with a bounded heap.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};

use crate::types::{PublicKey, ValidatorUpdate};

pub const MAX_VALIDATORS: usize = 100;

/// Stake units that buy one unit of voting power.
pub const UNITS_PER_POWER: u64 = 1_000_000_000;

/// Stake units per unit of power at `height`.
///
/// Constant for now; kept height-aware so the rate can change at a fork
/// height without touching callers.
pub fn units_per_power(_height: u64) -> u64 {
    UNITS_PER_POWER
}

pub fn power_of(stake: u64, height: u64) -> i64 {
    i64::try_from(stake / units_per_power(height)).unwrap_or(i64::MAX)
}

/// Validator snapshot keyed by hex public key.
pub type ValidatorSet = BTreeMap<String, ValidatorUpdate>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Candidate {
    index: u64,
    pub_key: PublicKey,
    power: i64,
}

// Greater means "preferred": more power, then lower index.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.power
            .cmp(&other.power)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Picks the active set from `(index, pub_key, stake)` triples.
///
/// Output is ordered by power descending, then index ascending.
pub fn select<I>(accounts: I, height: u64, limit: usize) -> Vec<ValidatorUpdate>
where
    I: IntoIterator<Item = (u64, PublicKey, u64)>,
{
    // Min-heap of the best `limit` candidates seen so far.
    let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(limit + 1);
    for (index, pub_key, stake) in accounts {
        let power = power_of(stake, height);
        if power <= 0 {
            continue;
        }
        heap.push(Reverse(Candidate {
            index,
            pub_key,
            power,
        }));
        if heap.len() > limit {
            heap.pop();
        }
    }

    // Ascending order of Reverse<_> is descending preference.
    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(c)| ValidatorUpdate {
            pub_key: c.pub_key,
            power: c.power,
        })
        .collect()
}

pub fn to_set(vals: &[ValidatorUpdate]) -> ValidatorSet {
    vals.iter().map(|v| (v.pub_key.to_hex(), *v)).collect()
}

/// Minimal update list turning `prev` into `next`.
///
/// Additions and power changes come first, then removals with power zero,
/// each group in key order.
pub fn diff(prev: &ValidatorSet, next: &ValidatorSet) -> Vec<ValidatorUpdate> {
    let mut updates: Vec<ValidatorUpdate> = next
        .iter()
        .filter(|(key, val)| prev.get(*key).is_none_or(|p| p.power != val.power))
        .map(|(_, val)| *val)
        .collect();

    updates.extend(
        prev.iter()
            .filter(|(key, _)| !next.contains_key(*key))
            .map(|(_, val)| ValidatorUpdate {
                pub_key: val.pub_key,
                power: 0,
            }),
    );
    updates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_key(i: u64) -> PublicKey {
        let mut pk = [0u8; 32];
        pk[..8].copy_from_slice(&i.to_be_bytes());
        PublicKey(pk)
    }

    fn dummy_accounts(stakes: &[u64]) -> Vec<(u64, PublicKey, u64)> {
        stakes
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let index = 65536 + i as u64;
                (index, dummy_key(index), *s)
            })
            .collect()
    }

    #[test]
    fn selection_orders_by_power_then_index() {
        let accounts = dummy_accounts(&[
            2 * UNITS_PER_POWER,
            5 * UNITS_PER_POWER,
            2 * UNITS_PER_POWER,
            UNITS_PER_POWER - 1,
        ]);
        let vals = select(accounts, 1, MAX_VALIDATORS);

        let got: Vec<(PublicKey, i64)> = vals.iter().map(|v| (v.pub_key, v.power)).collect();
        assert_eq!(
            got,
            vec![
                (dummy_key(65537), 5),
                (dummy_key(65536), 2),
                (dummy_key(65538), 2),
            ]
        );
    }

    #[test]
    fn selection_is_capped_and_keeps_lowest_indices_on_ties() {
        let accounts = dummy_accounts(&[UNITS_PER_POWER; 150]);
        let vals = select(accounts.clone(), 1, MAX_VALIDATORS);

        assert_eq!(vals.len(), MAX_VALIDATORS);
        assert_eq!(vals[0].pub_key, dummy_key(65536));
        assert_eq!(vals[99].pub_key, dummy_key(65536 + 99));

        let mut reversed = accounts;
        reversed.reverse();
        assert_eq!(select(reversed, 1, MAX_VALIDATORS), vals);
    }

    #[test]
    fn diff_reports_changes_then_removals() {
        let a = ValidatorUpdate {
            pub_key: dummy_key(1),
            power: 1,
        };
        let b = ValidatorUpdate {
            pub_key: dummy_key(2),
            power: 2,
        };
        let c = ValidatorUpdate {
            pub_key: dummy_key(3),
            power: 3,
        };
        let prev = to_set(&[a, b]);
        let next = to_set(&[
            ValidatorUpdate { power: 7, ..b },
            c,
        ]);

        let updates = diff(&prev, &next);
        assert_eq!(
            updates,
            vec![
                ValidatorUpdate { power: 7, ..b },
                c,
                ValidatorUpdate { power: 0, ..a },
            ]
        );
        assert!(diff(&next, &next).is_empty());
    }
}
