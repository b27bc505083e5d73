//! Reassembler state machine tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::{Duration, Instant};

use avastream_core::protocol::envelope::{encode, Body, ChatPayload, CommandPayload, Envelope, EventPayload};
use avastream_core::{ErrorCode, Ignored, MessageKind, Outcome, Reassembler, ReassemblyLimits, Sender};

fn chunk(mid: &str, idx: u32, fin: bool, text: &str) -> Envelope {
    Envelope::chunk(
        mid,
        idx,
        fin,
        Body::Chat(ChatPayload {
            text: text.into(),
            from: "bot".into(),
        }),
    )
}

fn ack(mid: &str) -> Envelope {
    Envelope::single(
        mid,
        Body::Command(CommandPayload {
            cmd: "set-params".into(),
            code: Some(1000),
            msg: Some("set params ok".into()),
            data: None,
        }),
    )
}

fn feed_all(r: &mut Reassembler, frames: Vec<Envelope>, now: Instant) -> Vec<String> {
    frames
        .into_iter()
        .filter_map(|f| r.feed(f, now).into_message())
        .map(|m| m.text)
        .collect()
}

#[test]
fn out_of_order_matches_in_order() {
    let now = Instant::now();
    let in_order = vec![chunk("m", 0, false, "Hel"), chunk("m", 1, false, "lo, "), chunk("m", 2, true, "world")];
    let shuffled = vec![chunk("m", 1, false, "lo, "), chunk("m", 0, false, "Hel"), chunk("m", 2, true, "world")];

    let a = feed_all(&mut Reassembler::default(), in_order, now);
    let b = feed_all(&mut Reassembler::default(), shuffled, now);
    assert_eq!(a, vec!["Hello, world".to_string()]);
    assert_eq!(a, b);
}

#[test]
fn final_chunk_first_waits_for_the_gap() {
    let mut r = Reassembler::default();
    let now = Instant::now();
    assert!(matches!(r.feed(chunk("m", 2, true, "c"), now), Outcome::Pending));
    assert!(matches!(r.feed(chunk("m", 0, false, "a"), now), Outcome::Pending));
    let msg = r.feed(chunk("m", 1, false, "b"), now).into_message().expect("complete");
    assert_eq!(msg.text, "abc");
    assert_eq!(msg.kind, MessageKind::Chat);
    assert_eq!(msg.sender, Sender::Remote);
    assert_eq!(msg.speaker.as_deref(), Some("bot"));
}

#[test]
fn unsupported_version_produces_nothing() {
    let mut r = Reassembler::default();
    let frame = br#"{"v":1,"type":"chat","mid":"x","pld":{"text":"hi","from":"bot"}}"#;
    match r.ingest(frame, Instant::now()) {
        Outcome::Ignored(Ignored::Discarded(d)) => assert_eq!(d.reason(), "version_mismatch"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(r.pending_len(), 0);
}

#[test]
fn garbage_between_chunks_does_not_disturb_assembly() {
    let mut r = Reassembler::default();
    let now = Instant::now();
    let first = encode(&chunk("m", 0, false, "one ")).unwrap();
    let second = encode(&chunk("m", 1, true, "two")).unwrap();

    assert!(matches!(r.ingest(&first, now), Outcome::Pending));
    assert!(matches!(r.ingest(b"\x00\x01not json", now), Outcome::Ignored(_)));
    assert!(matches!(r.ingest(br#"{"v":9}"#, now), Outcome::Ignored(_)));
    let msg = r.ingest(&second, now).into_message().expect("complete");
    assert_eq!(msg.text, "one two");
}

#[test]
fn duplicate_command_ack_surfaces_once() {
    let mut r = Reassembler::default();
    let now = Instant::now();
    let first = r.feed(ack("cmd-7"), now).into_message().expect("first ack");
    assert_eq!(first.kind, MessageKind::Command);
    assert_eq!(first.text, "set params ok");
    assert_eq!(first.metadata.as_ref().unwrap()["code"], 1000);

    assert!(matches!(r.feed(ack("cmd-7"), now), Outcome::Ignored(Ignored::Duplicate)));
}

#[test]
fn events_are_surfaced_immediately() {
    let mut r = Reassembler::default();
    let ev = Envelope::single(
        "evt-1",
        Body::Event(EventPayload {
            event: "audio_start".into(),
            data: None,
        }),
    );
    let msg = r.feed(ev, Instant::now()).into_message().expect("event");
    assert_eq!(msg.kind, MessageKind::Event);
    assert!(msg.is_system());
    assert_eq!(r.pending_len(), 0);
}

#[test]
fn duplicate_chunks_are_ignored() {
    let mut r = Reassembler::default();
    let now = Instant::now();
    assert!(matches!(r.feed(chunk("m", 0, false, "a"), now), Outcome::Pending));
    assert!(matches!(r.feed(chunk("m", 0, false, "a"), now), Outcome::Ignored(Ignored::Duplicate)));
    assert!(matches!(r.feed(chunk("m", 2, true, "c"), now), Outcome::Pending));
    assert!(matches!(r.feed(chunk("m", 2, true, "c"), now), Outcome::Ignored(Ignored::Duplicate)));
    assert_eq!(r.feed(chunk("m", 1, false, "b"), now).into_message().unwrap().text, "abc");
    // Late copy after completion.
    assert!(matches!(r.feed(chunk("m", 1, false, "b"), now), Outcome::Ignored(Ignored::Duplicate)));
}

#[test]
fn idle_partial_is_dropped_and_late_chunks_discarded() {
    let limits = ReassemblyLimits {
        idle_timeout: Duration::from_secs(60),
        ..ReassemblyLimits::default()
    };
    let mut r = Reassembler::new(limits);
    let t0 = Instant::now();

    assert!(matches!(r.feed(chunk("m", 1, false, "b"), t0), Outcome::Pending));
    assert!(r.sweep(t0 + Duration::from_secs(30)).is_empty());

    let gaps = r.sweep(t0 + Duration::from_secs(61));
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].code(), ErrorCode::ReassemblyGap);
    assert_eq!(r.pending_len(), 0);

    let late = r.feed(chunk("m", 0, false, "a"), t0 + Duration::from_secs(62));
    assert!(matches!(late, Outcome::Ignored(Ignored::Tombstoned)));
}

#[test]
fn out_of_order_buffer_is_bounded() {
    let limits = ReassemblyLimits {
        max_out_of_order: 4,
        ..ReassemblyLimits::default()
    };
    let mut r = Reassembler::new(limits);
    let now = Instant::now();
    for idx in 1..=4 {
        assert!(matches!(r.feed(chunk("m", idx, false, "x"), now), Outcome::Pending));
    }
    match r.feed(chunk("m", 5, false, "x"), now) {
        Outcome::Dropped(e) => assert_eq!(e.code(), ErrorCode::ReassemblyGap),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(r.pending_len(), 0);
}

#[test]
fn pending_message_limit_evicts_stalest() {
    let limits = ReassemblyLimits {
        max_pending: 2,
        ..ReassemblyLimits::default()
    };
    let mut r = Reassembler::new(limits);
    let t0 = Instant::now();
    r.feed(chunk("old", 0, false, "a"), t0);
    r.feed(chunk("mid", 0, false, "a"), t0 + Duration::from_secs(1));
    r.feed(chunk("new", 0, false, "a"), t0 + Duration::from_secs(2));
    assert_eq!(r.pending_len(), 2);
    assert!(matches!(
        r.feed(chunk("old", 1, true, "b"), t0 + Duration::from_secs(3)),
        Outcome::Ignored(Ignored::Tombstoned)
    ));
    assert_eq!(
        r.feed(chunk("mid", 1, true, "b"), t0 + Duration::from_secs(3))
            .into_message()
            .unwrap()
            .text,
        "ab"
    );
}

#[test]
fn conflicting_final_index_drops_message() {
    let mut r = Reassembler::default();
    let now = Instant::now();
    r.feed(chunk("m", 0, false, "a"), now);
    r.feed(chunk("m", 3, false, "d"), now);
    match r.feed(chunk("m", 1, true, "b"), now) {
        Outcome::Dropped(e) => assert_eq!(e.code(), ErrorCode::ReassemblyGap),
        other => panic!("unexpected outcome {other:?}"),
    }
}
