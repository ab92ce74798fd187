//! Grants, retraction, admission checks and queries.

mod common;

use common::{SwitchOracle, genesis_app, index_of, key, pubkey, run_height, signed, signed_by};
use hac_chain::consensus::abci::{
    CODE_ERR, CODE_UNKNOWN_PATH, PrepareProposalRequest, ProcessProposalRequest, ProposalVerdict,
    QueryRequest,
};
use hac_chain::state::validators::UNITS_PER_POWER;
use hac_chain::{
    Account, EventGrant, EventUnStake, EventUpdateValidators, GrantSt, GrantTx, ProposalTx,
    RetractTx, START_ACCOUNT_INDEX, TxPayload, ValidatorUpdate, VoteCode,
};

fn grant(seed: u8, amount: u64) -> TxPayload {
    TxPayload::Grant(GrantTx {
        grants: vec![GrantSt {
            statement: "runs an archive node".to_string(),
            amount,
            agent_url: "http://agent.local".to_string(),
            name: format!("member-{seed}"),
            pubkey: pubkey(seed).as_bytes().to_vec(),
        }],
    })
}

fn proposal() -> TxPayload {
    TxPayload::Proposal(ProposalTx {
        title: "t".to_string(),
        ..ProposalTx::default()
    })
}

#[test]
fn rejected_grant_consumes_index_then_accepted_grant_joins() {
    let oracle = SwitchOracle::new(false);
    let app = genesis_app(&[1, 1], oracle.clone());

    let (code, res) = run_height(&app, vec![signed(1, 0, grant(9, 2 * UNITS_PER_POWER))]);
    assert_eq!(code, VoteCode::RejectNewMember.code());
    let ev = EventGrant::decode(&res.tx_results[0].events[0]).unwrap();
    assert!(!ev.grant);
    assert_eq!(ev.validator, START_ACCOUNT_INDEX + 2);
    assert!(res.validator_updates.is_empty());
    let db = app.state_db();
    assert!(db.account_by_address(&pubkey(9).address(), 0).unwrap().0.is_none());
    assert_eq!(db.header().account_idx, START_ACCOUNT_INDEX + 3);

    oracle.set(true);
    let (code, res) = run_height(&app, vec![signed(1, 1, grant(9, 2 * UNITS_PER_POWER))]);
    assert_eq!(code, VoteCode::GrantNewMember.code());
    let ev = EventGrant::decode(&res.tx_results[0].events[0]).unwrap();
    assert!(ev.grant);
    assert_eq!(ev.validator, START_ACCOUNT_INDEX + 3);
    assert_eq!(ev.proposer_index, index_of(1));
    assert_eq!(
        res.validator_updates,
        vec![ValidatorUpdate {
            pub_key: pubkey(9),
            power: 2,
        }]
    );
    let update = res
        .events
        .iter()
        .find_map(EventUpdateValidators::decode)
        .unwrap();
    assert_eq!(update.updates, res.validator_updates);

    let (acnt, _) = db.account_by_index(START_ACCOUNT_INDEX + 3, 0).unwrap();
    let acnt = acnt.unwrap();
    assert_eq!(acnt.name, "member-9");
    assert_eq!(acnt.agent_url, "http://agent.local");
    assert_eq!(db.validator_accounts().unwrap().0.len(), 3);
    // The proposer's nonce moved twice, once per grant.
    assert_eq!(db.account_by_index(index_of(1), 0).unwrap().0.unwrap().nonce, 2);

    // The new member signs with its own key and index.
    let tx = signed_by(&key(9), START_ACCOUNT_INDEX + 3, 0, proposal());
    assert!(app.check_tx(&tx).is_ok());

    let dup = app.check_tx(&signed(2, 0, grant(9, 1)));
    assert_eq!(dup.log, "account already exists");
}

#[test]
fn grant_carries_exactly_one_candidate() {
    let app = genesis_app(&[1], SwitchOracle::new(true));
    let TxPayload::Grant(mut body) = grant(8, 1) else {
        unreachable!()
    };
    body.grants.push(body.grants[0].clone());
    let res = app.check_tx(&signed(1, 0, TxPayload::Grant(body)));
    assert_eq!(res.log, "only support one grant in one tx");

    let TxPayload::Grant(mut body) = grant(8, 1) else {
        unreachable!()
    };
    body.grants[0].pubkey.truncate(31);
    let res = app.check_tx(&signed(1, 0, TxPayload::Grant(body)));
    assert_eq!(res.log, "invalid public key");
}

#[test]
fn full_retract_leaves_the_validator_set() {
    let app = genesis_app(&[1, 2], SwitchOracle::new(true));

    let partial = app.check_tx(&signed(1, 0, TxPayload::Retract(RetractTx { amount: 5 })));
    assert_eq!(partial.log, "must retract all");

    let (code, res) = run_height(
        &app,
        vec![signed(
            1,
            0,
            TxPayload::Retract(RetractTx {
                amount: UNITS_PER_POWER,
            }),
        )],
    );
    assert_eq!(code, 0);
    let ev = EventUnStake::decode(&res.tx_results[0].events[0]).unwrap();
    assert_eq!(ev.validator, index_of(1));
    assert_eq!(ev.amount, UNITS_PER_POWER);
    assert_eq!(
        res.validator_updates,
        vec![ValidatorUpdate {
            pub_key: pubkey(1),
            power: 0,
        }]
    );

    let (vals, _) = app.state_db().validator_accounts().unwrap();
    assert_eq!(vals.len(), 1);
    assert_eq!(vals[0].index, index_of(2));

    let res = app.check_tx(&signed(1, 1, proposal()));
    assert_eq!(res.log, "not membership");
}

#[test]
fn nonce_must_match_in_blocks_but_may_run_ahead_in_checks() {
    let app = genesis_app(&[1], SwitchOracle::new(true));
    let ahead = signed(1, 3, proposal());
    assert!(app.check_tx(&ahead).is_ok());

    let prepared = app.prepare_proposal(&PrepareProposalRequest {
        height: 1,
        txs: vec![ahead.clone()],
    });
    assert!(prepared.txs.is_empty());
    let verdict = app.process_proposal(&ProcessProposalRequest {
        height: 1,
        txs: vec![ahead],
    });
    assert_eq!(verdict.status, ProposalVerdict::Reject);

    let first = signed(1, 0, proposal());
    run_height(&app, vec![first.clone()]);
    assert_eq!(app.check_tx(&first).log, "nonce invalid");
}

#[test]
fn forged_or_unknown_signers_are_refused() {
    let app = genesis_app(&[1, 1], SwitchOracle::new(true));

    let forged = signed_by(&key(2), index_of(1), 0, proposal());
    assert_eq!(app.check_tx(&forged).log, "signature invalid");

    let unknown = signed_by(&key(7), START_ACCOUNT_INDEX + 40, 0, proposal());
    assert_eq!(app.check_tx(&unknown).log, "validator noexists");

    let garbage = app.check_tx(b"{\"type\":9}");
    assert_eq!(garbage.code, CODE_ERR);
}

#[test]
fn queries_read_the_committed_state() {
    let app = genesis_app(&[2, 1], SwitchOracle::new(true));
    run_height(&app, vec![signed(1, 0, proposal())]);

    let by_index = app.query(&QueryRequest {
        path: "/accounts".to_string(),
        data: index_of(1).to_be_bytes().to_vec(),
        height: 0,
    });
    assert_eq!(by_index.code, 0, "{}", by_index.log);
    assert_eq!(by_index.height, 1);
    let acnt: Account = serde_json::from_slice(&by_index.value).unwrap();
    assert_eq!(acnt.nonce, 1);
    assert_eq!(acnt.stake, 2 * UNITS_PER_POWER);

    let by_address = app.query(&QueryRequest {
        path: "/accounts/".to_string(),
        data: pubkey(2).address().as_bytes().to_vec(),
        height: 0,
    });
    let acnt: Account = serde_json::from_slice(&by_address.value).unwrap();
    assert_eq!(acnt.index, index_of(2));

    let missing = app.query(&QueryRequest {
        path: "/accounts/".to_string(),
        data: 5u64.to_be_bytes().to_vec(),
        height: 0,
    });
    assert_eq!(missing.code, CODE_ERR);
    assert_eq!(missing.log, "account noexists");

    let vals = app.query(&QueryRequest {
        path: "/validators".to_string(),
        data: Vec::new(),
        height: 0,
    });
    let vals: Vec<Account> = serde_json::from_slice(&vals.value).unwrap();
    assert_eq!(
        vals.iter().map(|a| a.index).collect::<Vec<_>>(),
        vec![index_of(1), index_of(2)]
    );

    let unknown = app.query(&QueryRequest {
        path: "/blocks".to_string(),
        data: Vec::new(),
        height: 0,
    });
    assert_eq!(unknown.code, CODE_UNKNOWN_PATH);
}
