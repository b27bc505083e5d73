//! Media transport contract (WebRTC SDK side).
//!
//! The orchestrator consumes the channel only through [`MediaTransport`]:
//! membership, track publication, remote subscription, the data-channel send
//! primitive, and a push event stream delivered to registered listeners.

use async_trait::async_trait;
use bytes::Bytes;

use avastream_core::error::Result;

use super::listeners::Subscription;

/// Track media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Remote channel member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteUser {
    pub uid: u32,
}

/// Local capture track (microphone, camera). Owns a hardware device until stopped.
pub trait LocalTrack: Send + Sync {
    fn kind(&self) -> MediaKind;
    /// Release the underlying device.
    fn stop(&self);
}

/// Link quality as reported by the SDK (0 unknown, 1 best .. 6 down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkQuality {
    pub uplink: u8,
    pub downlink: u8,
}

/// Events pushed by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// SDK-level exception; `fatal` ones end the session.
    ConnectionException { code: i32, message: String, fatal: bool },
    UserPublished { user: RemoteUser, media: MediaKind },
    UserUnpublished { user: RemoteUser, media: MediaKind },
    TokenWillExpire,
    TokenDidExpire,
    NetworkQuality(NetworkQuality),
    /// Inbound data-channel frame.
    StreamMessage { uid: u32, payload: Bytes },
}

impl TransportEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::ConnectionException { .. } => "connection_exception",
            TransportEvent::UserPublished { .. } => "user_published",
            TransportEvent::UserUnpublished { .. } => "user_unpublished",
            TransportEvent::TokenWillExpire => "token_will_expire",
            TransportEvent::TokenDidExpire => "token_did_expire",
            TransportEvent::NetworkQuality(_) => "network_quality",
            TransportEvent::StreamMessage { .. } => "stream_message",
        }
    }
}

/// Callback invoked for each transport event. Must not block.
pub type EventListener = Box<dyn Fn(&TransportEvent) + Send + Sync>;

#[async_trait]
pub trait MediaTransport: Send + Sync {
    async fn join(&self, app_id: &str, channel: &str, token: &str, uid: u32) -> Result<()>;
    async fn leave(&self) -> Result<()>;

    async fn publish(&self, track: &dyn LocalTrack) -> Result<()>;
    /// `None` unpublishes every local track.
    async fn unpublish(&self, track: Option<&dyn LocalTrack>) -> Result<()>;

    async fn subscribe(&self, user: &RemoteUser, media: MediaKind) -> Result<()>;
    async fn unsubscribe(&self, user: &RemoteUser, media: MediaKind) -> Result<()>;

    /// Connected and assigned a uid; data-channel sends fail otherwise.
    fn is_ready(&self) -> bool;

    async fn send_stream_message(&self, payload: Bytes) -> Result<()>;

    /// Register an event listener for as long as the subscription lives.
    fn on_event(&self, listener: EventListener) -> Subscription;
}
