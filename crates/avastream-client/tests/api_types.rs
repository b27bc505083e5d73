#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use avastream_client::api::types::{parse_close_reply, parse_create_reply};
use avastream_client::api::SessionRequest;
use avastream_client::config::SessionSection;
use avastream_core::ErrorCode;

#[test]
fn create_reply_yields_credentials() {
    let body = br#"{"code":1000,"msg":"ok","data":{"_id":"s-1","credentials":{
        "agora_app_id":"app","agora_channel":"ch-9","agora_token":"tok","agora_uid":77}}}"#;
    let rec = parse_create_reply(body).expect("must parse");
    assert_eq!(rec.session_id, "s-1");
    assert_eq!(rec.credentials.channel, "ch-9");
    assert_eq!(rec.credentials.uid, 77);
}

#[test]
fn create_reply_without_credentials_is_configuration() {
    let body = br#"{"code":1000,"msg":"ok","data":{"_id":"s-1"}}"#;
    let err = parse_create_reply(body).expect_err("must fail");
    assert_eq!(err.code(), ErrorCode::Configuration);
}

#[test]
fn non_success_code_is_session_api_error() {
    let body = br#"{"code":4001,"msg":"quota exceeded"}"#;
    let err = parse_create_reply(body).expect_err("must fail");
    assert_eq!(err.code(), ErrorCode::SessionApi);
    assert!(err.to_string().contains("quota exceeded"));

    assert!(parse_close_reply(br#"{"code":1000,"msg":"ok"}"#).is_ok());
    assert!(parse_close_reply(br#"{"code":5000}"#).is_err());
}

#[test]
fn request_omits_empty_options() {
    let section = SessionSection {
        avatar_id: "av-1".into(),
        voice_id: Some(String::new()),
        language: Some("en".into()),
        ..SessionSection::default()
    };
    let json = serde_json::to_value(SessionRequest::from_config(&section)).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"avatar_id": "av-1", "duration": 600, "language": "en"})
    );
}
