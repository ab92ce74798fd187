//! Transaction envelopes as clients produce them.

mod common;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::{CHAIN, index_of, key, pubkey};
use hac_chain::{HacTx, RetractTx, TxError, TxPayload, TxType};

#[test]
fn hand_written_envelope_decodes() {
    let raw = br#"{"version":1,"type":4,"nonce":2,"validator":65536,"tx":{"amount":5},"sig":[]}"#;
    let tx = HacTx::unmarshal(raw).unwrap();
    assert_eq!(tx.tx_type(), TxType::Retract);
    assert_eq!(tx.nonce, 2);
    assert_eq!(tx.validator, 65536);
    assert_eq!(tx.payload, TxPayload::Retract(RetractTx { amount: 5 }));
    assert!(tx.sig.is_empty());
}

#[test]
fn byte_fields_travel_as_base64() {
    let pk = STANDARD.encode(pubkey(4).as_bytes());
    let raw = format!(
        r#"{{"version":1,"type":3,"nonce":0,"validator":65537,
            "tx":{{"grants":[{{"statement":"s","amount":7,"agentUrl":"u","name":"n","pubkey":"{pk}"}}]}},
            "sig":["AP8="]}}"#
    );
    let tx = HacTx::unmarshal(raw.as_bytes()).unwrap();
    let TxPayload::Grant(body) = &tx.payload else {
        panic!("decoded {:?}", tx.tx_type());
    };
    assert_eq!(body.grants[0].pubkey, pubkey(4).as_bytes().to_vec());
    assert_eq!(body.grants[0].agent_url, "u");
    assert_eq!(tx.sig, vec![vec![0x00, 0xff]]);

    let broken = raw.replace("AP8=", "AP8");
    assert!(HacTx::unmarshal(broken.as_bytes()).is_err());
}

#[test]
fn signing_bytes_carry_the_chain_id_as_base64() {
    let tx = HacTx::new(0, index_of(1), TxPayload::Retract(RetractTx { amount: 1 }));
    let msg = String::from_utf8(tx.sig_data(CHAIN).unwrap()).unwrap();
    let expected = format!(r#""sig":["{}"]"#, STANDARD.encode(CHAIN));
    assert!(msg.ends_with(&format!("{expected}}}")), "{msg}");
}

#[test]
fn unknown_type_tag_is_refused() {
    let raw = br#"{"version":1,"type":6,"nonce":0,"validator":1,"tx":{},"sig":[]}"#;
    assert!(matches!(
        HacTx::unmarshal(raw),
        Err(TxError::UnsupportedTxType(6))
    ));
}

#[test]
fn signature_binds_the_chain_id() {
    let mut tx = HacTx::new(0, index_of(1), TxPayload::Retract(RetractTx { amount: 1 }));
    tx.sign(CHAIN, &key(1)).unwrap();
    let decoded = HacTx::unmarshal(&tx.marshal().unwrap()).unwrap();
    assert_eq!(decoded, tx);

    let msg = decoded.sig_data(CHAIN).unwrap();
    assert!(pubkey(1).verify(&msg, &decoded.sig[0]));
    let other = decoded.sig_data("hac-other").unwrap();
    assert!(!pubkey(1).verify(&other, &decoded.sig[0]));
}
