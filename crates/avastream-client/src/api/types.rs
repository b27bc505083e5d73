use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use avastream_core::error::{AvatarError, Result};

use crate::config::SessionSection;

/// Success code of the session API's `{code, msg, data}` wrapper.
pub const API_SUCCESS: i64 = 1000;

/// Create-session request body. Empty options are omitted, never sent blank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRequest {
    pub avatar_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode_type: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_params: Option<BTreeMap<String, serde_json::Value>>,
}

pub(crate) fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

impl SessionRequest {
    pub fn from_config(s: &SessionSection) -> Self {
        Self {
            avatar_id: s.avatar_id.trim().to_owned(),
            duration: Some(s.duration_secs).filter(|d| *d > 0),
            knowledge_id: non_empty(&s.knowledge_id),
            voice_id: non_empty(&s.voice_id),
            voice_url: non_empty(&s.voice_url),
            language: non_empty(&s.language),
            mode_type: s.mode.filter(|m| *m > 0),
            background_url: non_empty(&s.background_url),
            voice_params: Some(s.voice_params.clone()).filter(|p| !p.is_empty()),
        }
    }
}

/// Media-channel join credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: String,
    pub channel: String,
    pub token: String,
    pub uid: u32,
}

/// One created session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: String,
    pub credentials: Credentials,
}

#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    // Missing `data` deserializes as `None`.
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SessionData {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    credentials: Option<WireCredentials>,
}

#[derive(Debug, Deserialize)]
struct WireCredentials {
    agora_app_id: String,
    agora_channel: String,
    agora_token: String,
    agora_uid: u32,
}

fn reply_error(code: i64, msg: Option<String>) -> AvatarError {
    AvatarError::SessionApi(format!(
        "code {code}: {}",
        msg.unwrap_or_else(|| "no message".into())
    ))
}

/// Parse a create-session reply body.
pub fn parse_create_reply(body: &[u8]) -> Result<SessionRecord> {
    let reply: ApiReply<SessionData> = serde_json::from_slice(body)
        .map_err(|e| AvatarError::SessionApi(format!("invalid create reply: {e}")))?;
    if reply.code != API_SUCCESS {
        return Err(reply_error(reply.code, reply.msg));
    }

    let data = reply
        .data
        .ok_or_else(|| AvatarError::SessionApi("create reply without data".into()))?;
    // A session without channel credentials cannot be joined.
    let c = data.credentials.ok_or_else(|| {
        AvatarError::Configuration(format!("session {} returned no channel credentials", data.id))
    })?;

    Ok(SessionRecord {
        session_id: data.id,
        credentials: Credentials {
            app_id: c.agora_app_id,
            channel: c.agora_channel,
            token: c.agora_token,
            uid: c.agora_uid,
        },
    })
}

/// Parse a close-session reply body.
pub fn parse_close_reply(body: &[u8]) -> Result<()> {
    let reply: ApiReply<serde_json::Value> = serde_json::from_slice(body)
        .map_err(|e| AvatarError::SessionApi(format!("invalid close reply: {e}")))?;
    if reply.code != API_SUCCESS {
        return Err(reply_error(reply.code, reply.msg));
    }
    Ok(())
}
