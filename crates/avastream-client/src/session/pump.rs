//! Per-session inbound task.
//!
//! The transport listener only enqueues events; this task is the single
//! owner of the reassembler. It exits when the listener subscription is
//! disposed (queue closed), the session it serves is closed, or the session
//! handle is gone. Teardown also aborts it.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use avastream_core::{Ignored, Outcome, Reassembler, ReassemblyLimits};

use crate::obs::ClientMetrics;
use crate::transport::{MediaTransport, TransportEvent};

use super::orchestrator::Inner;

pub(super) struct Pump {
    pub epoch: u64,
    pub inner: Weak<Inner>,
    pub transport: Arc<dyn MediaTransport>,
    pub metrics: Arc<ClientMetrics>,
    pub limits: ReassemblyLimits,
    pub gc_interval: Duration,
}

impl Pump {
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
        let mut reassembler = Reassembler::new(self.limits);
        let mut gc = tokio::time::interval(self.gc_interval);
        gc.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                ev = rx.recv() => {
                    let Some(ev) = ev else { break };
                    if !self.handle(&mut reassembler, ev).await {
                        break;
                    }
                }
                _ = gc.tick() => {
                    for gap in reassembler.sweep(Instant::now().into_std()) {
                        self.metrics.reassembly_dropped.inc(&[("reason", "idle")]);
                        tracing::warn!(epoch = self.epoch, error = %gap, "partial message dropped");
                    }
                }
            }
        }
        tracing::debug!(epoch = self.epoch, pending = reassembler.pending_len(), "inbound pump stopped");
    }

    /// Returns false once the session handle is gone.
    async fn handle(&self, reassembler: &mut Reassembler, ev: TransportEvent) -> bool {
        tracing::trace!(epoch = self.epoch, event = ev.name(), "transport event");
        match ev {
            TransportEvent::StreamMessage { uid, payload } => {
                match reassembler.ingest(&payload, Instant::now().into_std()) {
                    Outcome::Complete(msg) => {
                        self.metrics.messages_assembled.inc(&[("type", msg.kind.as_str())]);
                        tracing::debug!(uid, mid = %msg.id, kind = msg.kind.as_str(), "message received");
                        let Some(inner) = self.inner.upgrade() else { return false };
                        if !inner.record_inbound(self.epoch, msg) {
                            return false;
                        }
                    }
                    Outcome::Pending => {}
                    Outcome::Ignored(Ignored::Discarded(d)) => {
                        self.metrics.frames_discarded.inc(&[("reason", d.reason())]);
                        tracing::trace!(uid, error = %d.into_error(), "frame discarded");
                    }
                    Outcome::Ignored(other) => {
                        self.metrics.frames_ignored.inc(&[("reason", other.reason())]);
                        tracing::debug!(uid, reason = other.reason(), "frame ignored");
                    }
                    Outcome::Dropped(e) => {
                        self.metrics.reassembly_dropped.inc(&[("reason", "violation")]);
                        tracing::warn!(uid, error = %e, "partial message dropped");
                    }
                }
            }
            TransportEvent::UserPublished { user, media } => {
                if let Err(e) = self.transport.subscribe(&user, media).await {
                    tracing::warn!(uid = user.uid, media = media.as_str(), error = %e, "remote subscribe failed");
                } else {
                    tracing::info!(uid = user.uid, media = media.as_str(), "subscribed to remote track");
                }
            }
            TransportEvent::UserUnpublished { user, media } => {
                tracing::info!(uid = user.uid, media = media.as_str(), "remote track unpublished");
            }
            TransportEvent::NetworkQuality(q) => {
                let Some(inner) = self.inner.upgrade() else { return false };
                inner.quality.send_replace(q);
            }
            TransportEvent::TokenWillExpire => {
                tracing::warn!(epoch = self.epoch, "channel token will expire soon");
            }
            TransportEvent::TokenDidExpire => {
                tracing::warn!(epoch = self.epoch, "channel token expired; closing session");
                self.request_teardown("token expired");
            }
            TransportEvent::ConnectionException { code, message: detail, fatal } => {
                if fatal {
                    tracing::error!(epoch = self.epoch, code, %detail, "fatal connection exception; closing session");
                    self.request_teardown("connection exception");
                } else {
                    tracing::warn!(epoch = self.epoch, code, %detail, "connection exception");
                }
            }
        }
        true
    }

    /// Teardown runs on its own task: it disposes the subscription that feeds
    /// this pump, so the pump must not wait on it.
    fn request_teardown(&self, reason: &'static str) {
        let Some(inner) = self.inner.upgrade() else { return };
        let epoch = self.epoch;
        tokio::spawn(async move {
            inner.stop_epoch(epoch, reason).await;
        });
    }
}
