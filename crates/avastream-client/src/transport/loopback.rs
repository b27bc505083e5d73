//! In-memory media transport.
//!
//! Records every call and outbound frame, lets the caller inject transport
//! events, and can be told to delay or fail joins and to reject sends. Used by
//! the `avastream` binary's echo peer and by the integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;

use avastream_core::error::{AvatarError, Result};

use super::listeners::{ListenerRegistry, Subscription};
use super::media::{EventListener, LocalTrack, MediaKind, MediaTransport, RemoteUser, TransportEvent};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One recorded transport interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Join { channel: String, uid: u32 },
    Leave,
    Publish(MediaKind),
    Unpublish(Option<MediaKind>),
    Subscribe(u32, MediaKind),
    Unsubscribe(u32, MediaKind),
    TrackStopped(MediaKind),
}

type CallLog = Arc<Mutex<Vec<TransportCall>>>;

/// Outbound frame with its transmit time.
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub at: Instant,
    pub payload: Bytes,
}

#[derive(Debug, Default)]
struct Faults {
    join_delay: Option<Duration>,
    fail_join: bool,
    /// Reject sends once this many frames went out.
    fail_sends_after: Option<usize>,
}

pub struct LoopbackTransport {
    listeners: ListenerRegistry<TransportEvent>,
    calls: CallLog,
    joined_uid: Mutex<Option<u32>>,
    sent: Mutex<Vec<SentFrame>>,
    peer_tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    faults: Mutex<Faults>,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            listeners: ListenerRegistry::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            joined_uid: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            peer_tx: Mutex::new(None),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Stream of outbound frames for a simulated remote peer.
    pub fn take_outbound(&self) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.peer_tx) = Some(tx);
        rx
    }

    /// Capture track wired to this transport's call log.
    pub fn track(&self, kind: MediaKind) -> Arc<LoopbackTrack> {
        Arc::new(LoopbackTrack {
            kind,
            calls: Arc::clone(&self.calls),
            stopped: AtomicBool::new(false),
        })
    }

    /// Push an event to every registered listener.
    pub fn inject(&self, event: TransportEvent) {
        self.listeners.emit(&event);
    }

    /// Deliver an inbound data-channel frame from `uid`.
    pub fn deliver(&self, uid: u32, payload: impl Into<Bytes>) {
        self.inject(TransportEvent::StreamMessage {
            uid,
            payload: payload.into(),
        });
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    pub fn sent_frames(&self) -> Vec<SentFrame> {
        lock(&self.sent).clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_joined(&self) -> bool {
        lock(&self.joined_uid).is_some()
    }

    pub fn set_join_delay(&self, delay: Option<Duration>) {
        lock(&self.faults).join_delay = delay;
    }

    pub fn set_fail_join(&self, fail: bool) {
        lock(&self.faults).fail_join = fail;
    }

    pub fn fail_sends_after(&self, frames: Option<usize>) {
        lock(&self.faults).fail_sends_after = frames;
    }

    fn record(&self, call: TransportCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl MediaTransport for LoopbackTransport {
    async fn join(&self, _app_id: &str, channel: &str, _token: &str, uid: u32) -> Result<()> {
        let (delay, fail) = {
            let f = lock(&self.faults);
            (f.join_delay, f.fail_join)
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if fail {
            return Err(AvatarError::Transport("join rejected".into()));
        }

        let mut joined = lock(&self.joined_uid);
        if joined.is_some() {
            return Err(AvatarError::Transport("already joined a channel".into()));
        }
        *joined = Some(uid);
        drop(joined);

        self.record(TransportCall::Join {
            channel: channel.to_owned(),
            uid,
        });
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        *lock(&self.joined_uid) = None;
        self.record(TransportCall::Leave);
        Ok(())
    }

    async fn publish(&self, track: &dyn LocalTrack) -> Result<()> {
        if !self.is_joined() {
            return Err(AvatarError::Transport("publish before join".into()));
        }
        self.record(TransportCall::Publish(track.kind()));
        Ok(())
    }

    async fn unpublish(&self, track: Option<&dyn LocalTrack>) -> Result<()> {
        self.record(TransportCall::Unpublish(track.map(|t| t.kind())));
        Ok(())
    }

    async fn subscribe(&self, user: &RemoteUser, media: MediaKind) -> Result<()> {
        self.record(TransportCall::Subscribe(user.uid, media));
        Ok(())
    }

    async fn unsubscribe(&self, user: &RemoteUser, media: MediaKind) -> Result<()> {
        self.record(TransportCall::Unsubscribe(user.uid, media));
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.is_joined()
    }

    async fn send_stream_message(&self, payload: Bytes) -> Result<()> {
        if !self.is_ready() {
            return Err(AvatarError::Transport("data channel not connected".into()));
        }

        let mut sent = lock(&self.sent);
        if let Some(limit) = lock(&self.faults).fail_sends_after {
            if sent.len() >= limit {
                return Err(AvatarError::Transport("stream message rejected".into()));
            }
        }
        sent.push(SentFrame {
            at: Instant::now(),
            payload: payload.clone(),
        });
        drop(sent);

        if let Some(tx) = lock(&self.peer_tx).as_ref() {
            let _ = tx.send(payload);
        }
        Ok(())
    }

    fn on_event(&self, listener: EventListener) -> Subscription {
        self.listeners.on(move |ev| listener(ev))
    }
}

/// Capture track that records its stop in the transport call log.
pub struct LoopbackTrack {
    kind: MediaKind,
    calls: CallLog,
    stopped: AtomicBool,
}

impl LoopbackTrack {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl LocalTrack for LoopbackTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            lock(&self.calls).push(TransportCall::TrackStopped(self.kind));
        }
    }
}
