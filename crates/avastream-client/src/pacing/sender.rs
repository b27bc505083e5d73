use std::sync::Arc;

use avastream_core::error::{AvatarError, Result};
use avastream_core::protocol::envelope::{encode, Envelope};

use crate::obs::ClientMetrics;
use crate::transport::MediaTransport;

use super::pacer::RatePacer;

/// Writes envelopes to the data channel within the byte budget.
///
/// Frames of one `send` call go out in order. Independent calls share the
/// pacer and may interleave on the wire, so a short command is not held
/// behind a long chat. A transport failure aborts the rest of the batch;
/// frames already written stay written.
pub struct FrameSender {
    transport: Arc<dyn MediaTransport>,
    pacer: Arc<RatePacer>,
    metrics: Arc<ClientMetrics>,
}

impl FrameSender {
    pub fn new(transport: Arc<dyn MediaTransport>, pacer: Arc<RatePacer>, metrics: Arc<ClientMetrics>) -> Self {
        Self {
            transport,
            pacer,
            metrics,
        }
    }

    /// Returns the number of frames written.
    pub async fn send(&self, envelopes: &[Envelope]) -> Result<usize> {
        for (n, env) in envelopes.iter().enumerate() {
            let kind = env.kind().as_str();
            let frame = encode(env)?;

            let waited = self.pacer.acquire(frame.len()).await?;
            self.metrics.pacing_delay.observe(&[], waited);

            // Readiness may change while waiting for budget.
            if !self.transport.is_ready() {
                self.metrics.send_failures.inc(&[("type", kind)]);
                tracing::warn!(mid = %env.message_id, sent = n, total = envelopes.len(), "data channel not ready; aborting send");
                return Err(AvatarError::Transport("data channel not ready".into()));
            }

            let len = frame.len();
            if let Err(e) = self.transport.send_stream_message(frame).await {
                self.metrics.send_failures.inc(&[("type", kind)]);
                tracing::warn!(mid = %env.message_id, sent = n, total = envelopes.len(), error = %e, "stream message rejected; aborting send");
                return Err(match e {
                    AvatarError::Transport(m) => AvatarError::Transport(m),
                    other => AvatarError::Transport(other.to_string()),
                });
            }

            self.metrics.frames_sent.inc(&[("type", kind)]);
            self.metrics.bytes_sent.add(&[("type", kind)], len as u64);
            tracing::trace!(mid = %env.message_id, bytes = len, waited_ms = waited.as_millis() as u64, "frame sent");
        }

        Ok(envelopes.len())
    }
}
