//! Chunker tests: frame ceiling, chunk metadata, and reassembly round trips.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Instant;

use avastream_core::protocol::chunker::split;
use avastream_core::protocol::envelope::{
    encode, Body, ChatPayload, CommandPayload, EventPayload, Envelope, MAX_FRAME_BYTES,
};
use avastream_core::{ErrorCode, Reassembler};

const MID: &str = "0b6c3f2e-6f1d-4c6a-9d55-2b1a7e4c9f10";

fn chat(text: &str) -> Body {
    Body::Chat(ChatPayload {
        text: text.to_owned(),
        from: "user".to_owned(),
    })
}

fn frame_len(env: &Envelope) -> usize {
    encode(env).unwrap().len()
}

fn text_of(frames: &[Envelope]) -> String {
    frames
        .iter()
        .map(|f| match &f.body {
            Body::Chat(c) => c.text.as_str(),
            other => panic!("unexpected body {other:?}"),
        })
        .collect()
}

fn assert_well_formed(frames: &[Envelope], max: usize) {
    assert!(frames.len() > 1);
    let last = frames.len() - 1;
    for (i, f) in frames.iter().enumerate() {
        assert!(frame_len(f) <= max, "chunk {i} is {} bytes", frame_len(f));
        let mark = f.chunk.expect("chunk mark");
        assert_eq!(mark.index as usize, i);
        assert_eq!(mark.is_final, i == last);
        assert_eq!(f.message_id, MID);
    }
}

#[test]
fn frame_exactly_at_limit_is_not_chunked() {
    let overhead = frame_len(&Envelope::single(MID, chat("")));
    let fits = "x".repeat(MAX_FRAME_BYTES - overhead);

    let frames = split(MID, &chat(&fits), MAX_FRAME_BYTES).unwrap();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].chunk.is_none());
    assert_eq!(frame_len(&frames[0]), MAX_FRAME_BYTES);

    let over = "x".repeat(MAX_FRAME_BYTES - overhead + 1);
    let frames = split(MID, &chat(&over), MAX_FRAME_BYTES).unwrap();
    assert_well_formed(&frames, MAX_FRAME_BYTES);
    assert_eq!(text_of(&frames), over);
}

#[test]
fn two_thousand_byte_chat_becomes_three_chunks() {
    let text = "a".repeat(2000);
    let frames = split(MID, &chat(&text), MAX_FRAME_BYTES).unwrap();

    assert_eq!(frames.len(), 3);
    assert_well_formed(&frames, MAX_FRAME_BYTES);
    assert_eq!(text_of(&frames), text);

    let mut r = Reassembler::default();
    let now = Instant::now();
    let mut done = None;
    for f in frames {
        if let Some(m) = r.feed(f, now).into_message() {
            done = Some(m);
        }
    }
    assert_eq!(done.expect("message").text, text);
}

#[test]
fn multibyte_text_is_cut_on_char_boundaries() {
    let text = "語🦀é".repeat(400);
    let frames = split(MID, &chat(&text), MAX_FRAME_BYTES).unwrap();
    assert_well_formed(&frames, MAX_FRAME_BYTES);
    assert_eq!(text_of(&frames), text);
}

#[test]
fn escaped_characters_count_toward_the_limit() {
    let text = "\"quote\"\n\\slash\u{01}".repeat(120);
    let frames = split(MID, &chat(&text), MAX_FRAME_BYTES).unwrap();
    assert_well_formed(&frames, MAX_FRAME_BYTES);
    assert_eq!(text_of(&frames), text);
}

#[test]
fn reassembly_in_reverse_order_yields_original() {
    let text: String = (0..3000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let mut frames = split(MID, &chat(&text), 400).unwrap();
    assert_well_formed(&frames, 400);
    frames.reverse();

    let mut r = Reassembler::default();
    let now = Instant::now();
    let messages: Vec<_> = frames
        .into_iter()
        .filter_map(|f| r.feed(f, now).into_message())
        .collect();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, text);
    assert_eq!(r.pending_len(), 0);
}

#[test]
fn oversized_command_is_rejected() {
    let body = Body::Command(CommandPayload::request(
        "set-params",
        Some(serde_json::json!({ "bgurl": "x".repeat(2000) })),
    ));
    let err = split(MID, &body, MAX_FRAME_BYTES).expect_err("must fail");
    assert_eq!(err.code(), ErrorCode::PayloadTooLarge);
}

#[test]
fn oversized_event_is_rejected() {
    let body = Body::Event(EventPayload {
        event: "e".repeat(1200),
        data: None,
    });
    let err = split(MID, &body, MAX_FRAME_BYTES).expect_err("must fail");
    assert_eq!(err.code(), ErrorCode::PayloadTooLarge);
}

#[test]
fn frame_limit_below_overhead_is_a_configuration_error() {
    let err = split(MID, &chat(&"a".repeat(500)), 100).expect_err("must fail");
    assert_eq!(err.code(), ErrorCode::Configuration);
}
