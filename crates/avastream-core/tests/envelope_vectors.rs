//! Envelope decode vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use avastream_core::protocol::envelope::{decode, encode, Body, ChatPayload, CommandPayload, Decoded, Envelope};
use avastream_core::{AvatarError, ErrorCode};

mod vector_loader;
use vector_loader::TestVector;

fn load(name: &str) -> TestVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

#[test]
fn envelope_vectors() {
    let files = [
        "chat_single.json",
        "chat_chunk.json",
        "chat_chunk_no_fin.json",
        "command_ack.json",
        "event.json",
        "bad_version.json",
        "future_version.json",
        "unknown_type.json",
        "bad_payload.json",
        "not_json.json",
        "missing_version.json",
    ];

    for f in files {
        let v = load(f);
        let raw = v.frame.decode();
        let res = decode(&raw);

        if let Some(d) = v.expect_discard {
            match res {
                Decoded::Discarded(discard) => {
                    assert_eq!(discard.reason(), d.reason, "vector={}", v.description)
                }
                Decoded::Envelope(env) => panic!("vector={} decoded unexpectedly: {env:?}", v.description),
            }
            continue;
        }

        let Decoded::Envelope(env) = res else {
            panic!("vector={} was discarded", v.description);
        };
        let ex = v.expect.expect("missing expect block");

        assert_eq!(env.kind().as_str(), ex["kind"].as_str().unwrap(), "vector={}", v.description);
        assert_eq!(env.message_id, ex["mid"].as_str().unwrap(), "vector={}", v.description);

        match ex["idx"].as_u64() {
            Some(idx) => {
                let mark = env.chunk.expect("chunk mark");
                assert_eq!(mark.index as u64, idx, "vector={}", v.description);
                assert_eq!(mark.is_final, ex["fin"].as_bool().unwrap(), "vector={}", v.description);
            }
            None => assert!(env.chunk.is_none(), "vector={}", v.description),
        }

        match &env.body {
            Body::Chat(chat) => assert_eq!(chat.text, ex["text"].as_str().unwrap(), "vector={}", v.description),
            Body::Command(cmd) => {
                assert_eq!(cmd.cmd, ex["cmd"].as_str().unwrap(), "vector={}", v.description);
                assert_eq!(cmd.code, ex["code"].as_i64(), "vector={}", v.description);
            }
            Body::Event(ev) => assert_eq!(ev.event, ex["event"].as_str().unwrap(), "vector={}", v.description),
        }
    }
}

#[test]
fn encode_omits_chunk_fields_on_single_frames() {
    let env = Envelope::single(
        "m1",
        Body::Command(CommandPayload::request("interrupt", None)),
    );
    let bytes = encode(&env).unwrap();
    let s = std::str::from_utf8(&bytes).unwrap();
    assert_eq!(s, r#"{"v":2,"type":"command","mid":"m1","pld":{"cmd":"interrupt"}}"#);
}

#[test]
fn encode_writes_chunk_fields_in_wire_order() {
    let env = Envelope::chunk(
        "m2",
        3,
        true,
        Body::Chat(ChatPayload {
            text: "tail".into(),
            from: "user".into(),
        }),
    );
    let bytes = encode(&env).unwrap();
    let s = std::str::from_utf8(&bytes).unwrap();
    assert_eq!(
        s,
        r#"{"v":2,"type":"chat","mid":"m2","idx":3,"fin":true,"pld":{"text":"tail","from":"user"}}"#
    );
}

#[test]
fn decoded_envelope_encodes_back_to_same_value() {
    let raw = r#"{"v":2,"type":"event","mid":"e9","pld":{"event":"audio_end","data":{"n":1}}}"#;
    let Decoded::Envelope(env) = decode(raw.as_bytes()) else {
        panic!("expected envelope");
    };
    let again: serde_json::Value = serde_json::from_slice(&encode(&env).unwrap()).unwrap();
    let original: serde_json::Value = serde_json::from_str(raw).unwrap();
    assert_eq!(again, original);
}

#[test]
fn discards_map_to_non_retriable_errors() {
    let cases = [
        (r#"{"v":3,"type":"chat","mid":"m","pld":{"text":"x","from":"bot"}}"#, ErrorCode::ProtocolMismatch),
        ("not json", ErrorCode::Malformed),
    ];
    for (raw, code) in cases {
        let Decoded::Discarded(d) = decode(raw.as_bytes()) else {
            panic!("{raw} should be discarded");
        };
        let err = d.into_error();
        assert_eq!(err.code(), code);
        assert!(!err.is_retriable());
    }
    assert!(AvatarError::Timeout("join".into()).is_retriable());
}
