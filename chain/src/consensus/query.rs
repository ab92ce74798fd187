//! Read-only queries against the committed state.
//!
//! Paths are normalised to end with `/` and routed to a [`Querier`].
//! Unknown paths answer [`CODE_UNKNOWN_PATH`].

use std::collections::BTreeMap;

use tracing::debug;

use super::abci::{CODE_ERR, CODE_UNKNOWN_PATH, QueryRequest, QueryResponse};
use crate::state::{StateDB, StateError, keys};
use crate::types::{ADDRESS_LEN, Account, Address};

pub const PATH_ACCOUNTS: &str = "/accounts/";
pub const PATH_VALIDATORS: &str = "/validators/";

pub trait Querier: Send + Sync {
    fn query(&self, db: &StateDB, req: &QueryRequest) -> QueryResponse;
}

fn json_response<T: serde::Serialize>(value: &T, height: u64) -> QueryResponse {
    match serde_json::to_vec(value) {
        Ok(value) => QueryResponse {
            value,
            height,
            ..QueryResponse::default()
        },
        Err(e) => QueryResponse::failed(CODE_ERR, e.to_string()),
    }
}

/// `/accounts/`: data is a 20-byte address or an index of up to eight
/// big-endian bytes. A nonzero request height reads that past commit.
pub struct AccountQuerier;

impl AccountQuerier {
    fn lookup(
        db: &StateDB,
        data: &[u8],
        height: u64,
    ) -> Result<(Option<Account>, u64), StateError> {
        if data.len() == ADDRESS_LEN {
            if let Some(addr) = Address::from_slice(data) {
                return db.account_by_address(&addr, height);
            }
        }
        match keys::decode_u64(data) {
            Some(idx) => db.account_by_index(idx, height),
            None => Ok((None, 0)),
        }
    }
}

impl Querier for AccountQuerier {
    fn query(&self, db: &StateDB, req: &QueryRequest) -> QueryResponse {
        match Self::lookup(db, &req.data, req.height) {
            Ok((Some(acnt), height)) => json_response(&acnt, height),
            Ok((None, _)) => QueryResponse::failed(CODE_ERR, "account noexists"),
            Err(e) => QueryResponse::failed(CODE_ERR, e.to_string()),
        }
    }
}

/// `/validators/`: accounts of the latest committed validator set. The
/// request height is ignored.
pub struct ValidatorQuerier;

impl Querier for ValidatorQuerier {
    fn query(&self, db: &StateDB, _req: &QueryRequest) -> QueryResponse {
        match db.validator_accounts() {
            Ok((accounts, height)) => json_response(&accounts, height),
            Err(e) => QueryResponse::failed(CODE_ERR, e.to_string()),
        }
    }
}

pub struct QueryRouter {
    routes: BTreeMap<&'static str, Box<dyn Querier>>,
}

impl Default for QueryRouter {
    fn default() -> Self {
        let mut routes: BTreeMap<&'static str, Box<dyn Querier>> = BTreeMap::new();
        routes.insert(PATH_ACCOUNTS, Box::new(AccountQuerier));
        routes.insert(PATH_VALIDATORS, Box::new(ValidatorQuerier));
        Self { routes }
    }
}

impl QueryRouter {
    pub fn route(&self, db: &StateDB, req: &QueryRequest) -> QueryResponse {
        let mut path = req.path.clone();
        if !path.ends_with('/') {
            path.push('/');
        }
        match self.routes.get(path.as_str()) {
            Some(q) => q.query(db, req),
            None => {
                debug!(%path, "unknown query path");
                QueryResponse::failed(CODE_UNKNOWN_PATH, format!("unknown path {path}"))
            }
        }
    }
}
