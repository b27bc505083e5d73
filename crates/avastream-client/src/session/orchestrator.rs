//! Session orchestrator.
//!
//! Owns the lifecycle `Idle -> Joining -> Joined -> Active -> Closing -> Idle`.
//! Transitions are serialized by one async mutex; chat and command sends only
//! read the published state and never take it. Each successful bring-up gets
//! a new epoch so teardown requested by a stale event is ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use avastream_core::error::{AvatarError, Result};
use avastream_core::protocol::envelope::{Body, ChatPayload, CommandPayload};
use avastream_core::{split, LogicalMessage};

use crate::api::{SessionApi, SessionRequest};
use crate::config::ClientConfig;
use crate::obs::ClientMetrics;
use crate::pacing::{FrameSender, RatePacer};
use crate::transport::{LocalTrack, MediaTransport, NetworkQuality, Subscription, TransportEvent};

use super::history::MessageLog;
use super::params::{AvatarParams, INTERRUPT_CMD};
use super::pump::Pump;
use super::state::SessionState;

/// Speaker tag of locally typed chat.
pub const LOCAL_SPEAKER: &str = "user";

const EVENT_QUEUE: usize = 64;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resources held while a session is up. Guarded by the lifecycle mutex.
#[derive(Default)]
struct Lifecycle {
    session_id: Option<String>,
    /// A join was attempted; `leave` is owed.
    joined: bool,
    subscription: Option<Subscription>,
    tracks: Vec<Arc<dyn LocalTrack>>,
    pump: Option<JoinHandle<()>>,
}

pub(super) struct Inner {
    config: ClientConfig,
    api: Arc<dyn SessionApi>,
    transport: Arc<dyn MediaTransport>,
    sender: FrameSender,
    metrics: Arc<ClientMetrics>,

    lifecycle: tokio::sync::Mutex<Lifecycle>,
    epoch: AtomicU64,
    state: watch::Sender<SessionState>,
    transitions: broadcast::Sender<SessionState>,

    messages: broadcast::Sender<LogicalMessage>,
    history: Mutex<MessageLog>,
    params: Mutex<AvatarParams>,
    pub(super) quality: watch::Sender<NetworkQuality>,
}

/// Client handle for one avatar. Cheap to clone; every clone drives the same
/// session and shares the same byte budget.
#[derive(Clone)]
pub struct AvatarSession {
    inner: Arc<Inner>,
}

impl AvatarSession {
    pub fn new(config: ClientConfig, api: Arc<dyn SessionApi>, transport: Arc<dyn MediaTransport>) -> Self {
        let metrics = Arc::new(ClientMetrics::default());
        let pacer = Arc::new(RatePacer::new(config.protocol.bytes_per_sec));
        let sender = FrameSender::new(Arc::clone(&transport), pacer, Arc::clone(&metrics));

        let (state, _) = watch::channel(SessionState::Idle);
        let (transitions, _) = broadcast::channel(EVENT_QUEUE);
        let (messages, _) = broadcast::channel(EVENT_QUEUE);
        let (quality, _) = watch::channel(NetworkQuality::default());

        let history = MessageLog::new(config.protocol.system_history);
        let params = AvatarParams::from_config(&config.session);

        Self {
            inner: Arc::new(Inner {
                config,
                api,
                transport,
                sender,
                metrics,
                lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
                epoch: AtomicU64::new(0),
                state,
                transitions,
                messages,
                history: Mutex::new(history),
                params: Mutex::new(params),
                quality,
            }),
        }
    }

    /// Create the remote session, join the channel and open the data path.
    ///
    /// A session already up is torn down first. Any failure rolls back
    /// through the close sequence and is returned.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        inner.config.require_credentials()?;

        let mut lc = inner.lifecycle.lock().await;
        if inner.state() != SessionState::Idle {
            tracing::info!(state = inner.state().as_str(), "session restart; closing current session first");
            inner.teardown(&mut lc, "restart").await;
        }

        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        inner.set_state(SessionState::Joining);

        match inner.bring_up(&mut lc, epoch).await {
            Ok(()) => {
                inner.set_state(SessionState::Active);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(epoch, code = e.code().as_str(), error = %e, "session start failed; rolling back");
                inner.teardown(&mut lc, "start failed").await;
                Err(e)
            }
        }
    }

    /// Close the session. No-op when idle. Step failures are logged, not returned.
    pub async fn stop(&self) -> Result<()> {
        let mut lc = self.inner.lifecycle.lock().await;
        if self.inner.state() == SessionState::Idle {
            return Ok(());
        }
        self.inner.teardown(&mut lc, "stop").await;
        Ok(())
    }

    /// Send chat text, chunked as needed. Returns the message as logged locally.
    pub async fn send_chat(&self, text: impl Into<String>) -> Result<LogicalMessage> {
        let inner = &self.inner;
        inner.ensure_active()?;

        let text = text.into();
        let id = Uuid::new_v4().to_string();
        let body = Body::Chat(ChatPayload {
            text: text.clone(),
            from: LOCAL_SPEAKER.to_owned(),
        });
        let frames = split(&id, &body, inner.config.protocol.max_frame_bytes)?;
        inner.sender.send(&frames).await?;

        tracing::debug!(mid = %id, frames = frames.len(), bytes = text.len(), "chat sent");
        let msg = LogicalMessage::local_chat(id, text, LOCAL_SPEAKER);
        inner.record(msg.clone());
        Ok(msg)
    }

    /// Push new avatar parameters to the live session.
    pub async fn set_params(&self, params: AvatarParams) -> Result<()> {
        self.inner.ensure_active()?;
        self.inner.send_command(params.to_command()?).await?;
        *lock(&self.inner.params) = params;
        Ok(())
    }

    /// Ask the avatar to stop speaking.
    pub async fn interrupt(&self) -> Result<()> {
        self.inner.ensure_active()?;
        self.inner
            .send_command(CommandPayload::request(INTERRUPT_CMD, None))
            .await
    }

    /// Publish a local capture track. It is unpublished and stopped on close.
    pub async fn publish_track(&self, track: Arc<dyn LocalTrack>) -> Result<()> {
        let mut lc = self.inner.lifecycle.lock().await;
        if !self.inner.state().is_connected() {
            return Err(AvatarError::Transport("no channel joined".into()));
        }
        self.inner.transport.publish(track.as_ref()).await?;
        tracing::info!(kind = track.kind().as_str(), "local track published");
        lc.tracks.push(track);
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Every state entered from now on, in order.
    pub fn state_changes(&self) -> broadcast::Receiver<SessionState> {
        self.inner.transitions.subscribe()
    }

    /// Latest state; useful to await a specific state.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Complete logical messages, local and remote.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<LogicalMessage> {
        self.inner.messages.subscribe()
    }

    pub fn history(&self) -> Vec<LogicalMessage> {
        lock(&self.inner.history).entries().to_vec()
    }

    pub fn network_quality(&self) -> watch::Receiver<NetworkQuality> {
        self.inner.quality.subscribe()
    }

    pub fn params(&self) -> AvatarParams {
        lock(&self.inner.params).clone()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.inner.lifecycle.lock().await.session_id.clone()
    }

    pub fn metrics(&self) -> Arc<ClientMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl Inner {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev == next {
            return;
        }
        self.metrics
            .session_transitions
            .inc(&[("state", next.as_str())]);
        tracing::info!(from = prev.as_str(), to = next.as_str(), epoch = self.epoch.load(Ordering::SeqCst), "session state");
        let _ = self.transitions.send(next);
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state() {
            SessionState::Active => Ok(()),
            other => Err(AvatarError::Transport(format!(
                "session not active (state {})",
                other.as_str()
            ))),
        }
    }

    fn record(&self, msg: LogicalMessage) {
        lock(&self.history).push(msg.clone());
        let _ = self.messages.send(msg);
    }

    /// Record an inbound message only while session `epoch` is still up.
    /// Returns false for a closed or superseded session.
    pub(super) fn record_inbound(&self, epoch: u64, msg: LogicalMessage) -> bool {
        let mut history = lock(&self.history);
        if self.epoch.load(Ordering::SeqCst) != epoch || !self.state().is_connected() {
            tracing::debug!(epoch, mid = %msg.id, "inbound message after close dropped");
            return false;
        }
        history.push(msg.clone());
        let _ = self.messages.send(msg);
        true
    }

    async fn send_command(&self, cmd: CommandPayload) -> Result<()> {
        let id = Uuid::new_v4().to_string();
        let name = cmd.cmd.clone();
        let frames = split(&id, &Body::Command(cmd), self.config.protocol.max_frame_bytes)?;
        self.sender.send(&frames).await?;
        tracing::debug!(mid = %id, cmd = %name, "command sent");
        Ok(())
    }

    async fn bring_up(self: &Arc<Self>, lc: &mut Lifecycle, epoch: u64) -> Result<()> {
        let request = SessionRequest::from_config(&self.config.session);
        let record = match self.api.create_session(&request).await {
            Ok(r) => {
                self.metrics.api_calls.inc(&[("op", "create"), ("result", "ok")]);
                r
            }
            Err(e) => {
                self.metrics.api_calls.inc(&[("op", "create"), ("result", "error")]);
                return Err(e);
            }
        };
        lc.session_id = Some(record.session_id.clone());
        tracing::info!(epoch, session_id = %record.session_id, "remote session created");

        let c = &record.credentials;
        let timeout = self.config.lifecycle.join_timeout();
        lc.joined = true;
        match tokio::time::timeout(timeout, self.transport.join(&c.app_id, &c.channel, &c.token, c.uid)).await {
            Ok(joined) => joined?,
            Err(_) => {
                return Err(AvatarError::Timeout(format!(
                    "channel join exceeded {} ms",
                    timeout.as_millis()
                )))
            }
        }
        tracing::info!(epoch, channel = %c.channel, uid = c.uid, "channel joined");

        let (tx, rx) = mpsc::unbounded_channel::<TransportEvent>();
        lc.subscription = Some(self.transport.on_event(Box::new(move |ev: &TransportEvent| {
            let _ = tx.send(ev.clone());
        })));
        self.set_state(SessionState::Joined);

        let pump = Pump {
            epoch,
            inner: Arc::downgrade(self),
            transport: Arc::clone(&self.transport),
            metrics: Arc::clone(&self.metrics),
            limits: self.config.protocol.reassembly_limits(),
            gc_interval: self.config.lifecycle.gc_interval(),
        };
        lc.pump = Some(tokio::spawn(pump.run(rx)));

        let params = lock(&self.params).clone();
        self.send_command(params.to_command()?).await?;
        Ok(())
    }

    /// Teardown requested by an inbound event of session `epoch`.
    pub(super) async fn stop_epoch(&self, epoch: u64, reason: &'static str) {
        let mut lc = self.lifecycle.lock().await;
        let current = self.epoch.load(Ordering::SeqCst);
        if current != epoch || !self.state().is_connected() {
            tracing::debug!(epoch, current, reason, "stale teardown request ignored");
            return;
        }
        self.teardown(&mut lc, reason).await;
    }

    /// Close sequence: listener, local tracks, channel, remote session.
    /// Each step runs even if an earlier one failed.
    async fn teardown(&self, lc: &mut Lifecycle, reason: &'static str) {
        self.set_state(SessionState::Closing);
        tracing::info!(reason, "closing session");

        if let Some(sub) = lc.subscription.take() {
            sub.dispose();
        }
        // Frames still queued for the pump belong to the closed session.
        if let Some(pump) = lc.pump.take() {
            pump.abort();
        }

        let tracks = std::mem::take(&mut lc.tracks);
        if !tracks.is_empty() {
            let results = join_all(tracks.iter().map(|t| self.transport.unpublish(Some(t.as_ref())))).await;
            for (track, r) in tracks.iter().zip(results) {
                if let Err(e) = r {
                    tracing::warn!(kind = track.kind().as_str(), error = %e, "unpublish failed");
                }
                track.stop();
            }
        }

        if std::mem::take(&mut lc.joined) {
            if let Err(e) = self.transport.leave().await {
                tracing::warn!(error = %e, "channel leave failed");
            }
        }

        if let Some(id) = lc.session_id.take() {
            match self.api.close_session(&id).await {
                Ok(()) => {
                    self.metrics.api_calls.inc(&[("op", "close"), ("result", "ok")]);
                    tracing::info!(session_id = %id, "remote session closed");
                }
                Err(e) => {
                    self.metrics.api_calls.inc(&[("op", "close"), ("result", "error")]);
                    tracing::warn!(session_id = %id, error = %e, "close session failed");
                }
            }
        }

        self.set_state(SessionState::Idle);
    }
}
