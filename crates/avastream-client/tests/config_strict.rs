#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use avastream_client::config;
use avastream_core::ErrorCode;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
protocol:
  max_frame_bytez: 900 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code(), ErrorCode::Configuration);
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.protocol.max_frame_bytes, 950);
    assert_eq!(cfg.protocol.bytes_per_sec, 6000);
    assert_eq!(cfg.protocol.system_history, 10);
    assert_eq!(cfg.lifecycle.join_timeout_ms, 30000);
    assert_eq!(cfg.protocol.reassembly_limits().max_out_of_order, 64);
}

#[test]
fn full_session_section_parses() {
    let ok = r#"
version: 1
api:
  host: "https://avatar.example.com"
  token: "secret"
session:
  avatar_id: "av-42"
  duration_secs: 300
  voice_id: "v-1"
  language: "en"
  mode: 2
  voice_params:
    speed: 1.2
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    cfg.require_credentials().expect("credentials present");
    assert_eq!(cfg.session.mode, Some(2));
    assert_eq!(cfg.session.voice_params["speed"], serde_json::json!(1.2));
}

#[test]
fn wrong_version_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.code(), ErrorCode::Configuration);
}

#[test]
fn range_errors() {
    for bad in [
        "version: 1\nprotocol: { max_frame_bytes: 64 }\n",
        "version: 1\nprotocol: { bytes_per_sec: 500 }\n",
        "version: 1\nsession: { mode: 3 }\n",
        "version: 1\nlifecycle: { join_timeout_ms: 10 }\n",
        "version: 1\nlifecycle: { gc_interval_ms: 60000 }\n",
    ] {
        let err = config::load_from_str(bad).expect_err(bad);
        assert_eq!(err.code(), ErrorCode::Configuration, "{bad}");
    }
}

#[test]
fn missing_credentials_reported() {
    let cfg = config::load_from_str("version: 1\napi: { host: \"h\", token: \"t\" }\n").unwrap();
    let err = cfg.require_credentials().expect_err("avatar id missing");
    assert!(err.to_string().contains("avatar_id"));
}
