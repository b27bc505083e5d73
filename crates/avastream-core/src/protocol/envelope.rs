//! Data-channel envelope (JSON, version 2).
//!
//! Wire shape: `{"v":2,"type":"chat","mid":"..","idx":0,"fin":false,"pld":{..}}`.
//! `idx`/`fin` are present only on chunked messages. The payload is kept as a
//! borrowed `RawValue` until the `type` tag is known, then parsed straight into
//! the matching [`Body`] variant.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::{AvatarError, Result};

/// The only protocol version accepted on the wire.
pub const PROTOCOL_VERSION: u64 = 2;

/// Upper bound of one encoded envelope on the data channel.
pub const MAX_FRAME_BYTES: usize = 950;

/// Command acknowledgment code reported by the avatar service on success.
pub const ACK_SUCCESS: i64 = 1000;

/// Envelope category (field name is `type` in JSON).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
    Command,
    Event,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Chat => "chat",
            MessageKind::Command => "command",
            MessageKind::Event => "event",
        }
    }
}

/// Chat text plus the speaker tag (`user` for the local side, `bot` for the avatar).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub text: String,
    pub from: String,
}

/// Command request or acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandPayload {
    /// Outbound command without status fields.
    pub fn request(cmd: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            cmd: cmd.into(),
            code: None,
            msg: None,
            data,
        }
    }

    /// True when this is an acknowledgment carrying the success code.
    pub fn is_success(&self) -> bool {
        self.code == Some(ACK_SUCCESS)
    }
}

/// Event notification pushed by the avatar service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Typed envelope payload, one variant per [`MessageKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Chat(ChatPayload),
    Command(CommandPayload),
    Event(EventPayload),
}

impl Body {
    pub fn kind(&self) -> MessageKind {
        match self {
            Body::Chat(_) => MessageKind::Chat,
            Body::Command(_) => MessageKind::Command,
            Body::Event(_) => MessageKind::Event,
        }
    }
}

/// Chunk position of a frame inside its logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkMark {
    /// Zero-based chunk index.
    pub index: u32,
    /// Set on the last chunk only.
    pub is_final: bool,
}

/// One decoded (or to-be-encoded) wire frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Logical message id shared by every chunk of the message.
    pub message_id: String,
    /// `None` for single-frame messages.
    pub chunk: Option<ChunkMark>,
    pub body: Body,
}

impl Envelope {
    /// Unchunked envelope.
    pub fn single(message_id: impl Into<String>, body: Body) -> Self {
        Self {
            message_id: message_id.into(),
            chunk: None,
            body,
        }
    }

    /// Envelope carrying chunk metadata.
    pub fn chunk(message_id: impl Into<String>, index: u32, is_final: bool, body: Body) -> Self {
        Self {
            message_id: message_id.into(),
            chunk: Some(ChunkMark { index, is_final }),
            body,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }
}

#[derive(Serialize)]
struct WireOut<'a, P: Serialize> {
    v: u64,
    #[serde(rename = "type")]
    kind: MessageKind,
    mid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    idx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fin: Option<bool>,
    pld: &'a P,
}

fn to_wire<P: Serialize>(env: &Envelope, pld: &P) -> serde_json::Result<Vec<u8>> {
    let (idx, fin) = match env.chunk {
        Some(c) => (Some(c.index), Some(c.is_final)),
        None => (None, None),
    };
    serde_json::to_vec(&WireOut {
        v: PROTOCOL_VERSION,
        kind: env.kind(),
        mid: &env.message_id,
        idx,
        fin,
        pld,
    })
}

/// Encode an envelope into its canonical wire bytes.
pub fn encode(env: &Envelope) -> Result<Bytes> {
    let res = match &env.body {
        Body::Chat(p) => to_wire(env, p),
        Body::Command(p) => to_wire(env, p),
        Body::Event(p) => to_wire(env, p),
    };
    res.map(Bytes::from).map_err(|e| {
        AvatarError::Encoding(format!("{} envelope {}: {e}", env.kind().as_str(), env.message_id))
    })
}

/// Encoded size of an envelope in bytes.
pub fn encoded_len(env: &Envelope) -> Result<usize> {
    encode(env).map(|b| b.len())
}

/// Why an inbound frame was dropped at the decode boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discard {
    /// `v` present but not [`PROTOCOL_VERSION`].
    VersionMismatch(u64),
    /// Not JSON, unknown `type`, or payload of the wrong shape.
    Malformed(String),
}

impl Discard {
    /// Short label used for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Discard::VersionMismatch(_) => "version_mismatch",
            Discard::Malformed(_) => "malformed",
        }
    }

    pub fn into_error(self) -> AvatarError {
        match self {
            Discard::VersionMismatch(v) => AvatarError::ProtocolMismatch(v),
            Discard::Malformed(m) => AvatarError::Malformed(m),
        }
    }
}

/// Result of decoding one inbound frame. Decoding never fails outward.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Envelope(Envelope),
    Discarded(Discard),
}

#[derive(Deserialize)]
struct VersionHeader {
    v: u64,
}

#[derive(Deserialize)]
struct WireIn<'a> {
    #[serde(rename = "type")]
    kind: MessageKind,
    mid: String,
    #[serde(default)]
    idx: Option<u32>,
    #[serde(default)]
    fin: Option<bool>,
    #[serde(borrow)]
    pld: &'a RawValue,
}

fn parse_payload<'de, T: Deserialize<'de>>(raw: &'de RawValue, kind: MessageKind) -> std::result::Result<T, Discard> {
    serde_json::from_str(raw.get())
        .map_err(|e| Discard::Malformed(format!("invalid {} payload: {e}", kind.as_str())))
}

fn try_decode(bytes: &[u8]) -> std::result::Result<Envelope, Discard> {
    // Version first: a future protocol may change every other field.
    let header: VersionHeader = serde_json::from_slice(bytes)
        .map_err(|e| Discard::Malformed(format!("invalid envelope json: {e}")))?;
    if header.v != PROTOCOL_VERSION {
        return Err(Discard::VersionMismatch(header.v));
    }

    let wire: WireIn<'_> = serde_json::from_slice(bytes)
        .map_err(|e| Discard::Malformed(format!("invalid envelope: {e}")))?;

    let body = match wire.kind {
        MessageKind::Chat => Body::Chat(parse_payload(wire.pld, wire.kind)?),
        MessageKind::Command => Body::Command(parse_payload(wire.pld, wire.kind)?),
        MessageKind::Event => Body::Event(parse_payload(wire.pld, wire.kind)?),
    };

    let chunk = wire.idx.map(|index| ChunkMark {
        index,
        is_final: wire.fin.unwrap_or(false),
    });

    Ok(Envelope {
        message_id: wire.mid,
        chunk,
        body,
    })
}

/// Decode one inbound frame; unsupported or malformed frames come back as
/// [`Decoded::Discarded`] after being logged.
pub fn decode(bytes: &[u8]) -> Decoded {
    match try_decode(bytes) {
        Ok(env) => Decoded::Envelope(env),
        Err(discard) => {
            tracing::debug!(reason = discard.reason(), detail = ?discard, len = bytes.len(), "inbound frame discarded");
            Decoded::Discarded(discard)
        }
    }
}
