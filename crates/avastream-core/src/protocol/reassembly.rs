//! Inbound reassembly of chunked chat messages.
//!
//! State per `mid`: absent -> assembling -> complete (handed out, then forgotten).
//! Chunk indices are authoritative; arrival order is not. Command and event
//! frames bypass the state machine and are surfaced at once, deduplicated by
//! `mid`. Time is passed in by the caller so the reassembler stays runtime-free.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::AvatarError;
use crate::protocol::envelope::{decode, Body, ChunkMark, Decoded, Discard, Envelope, MessageKind};

/// Bounds for partial-message tracking.
#[derive(Debug, Clone, Copy)]
pub struct ReassemblyLimits {
    /// Partial message idle longer than this is dropped.
    pub idle_timeout: Duration,
    /// Parked out-of-order chunks allowed per message.
    pub max_out_of_order: usize,
    /// Concurrent partial messages; the stalest is dropped beyond this.
    pub max_pending: usize,
    /// Remembered ids for duplicate suppression and late-chunk tombstones.
    pub recent_ids: usize,
}

impl Default for ReassemblyLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            max_out_of_order: 64,
            max_pending: 128,
            recent_ids: 1024,
        }
    }
}

/// Which side produced a logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    Local,
    Remote,
}

/// Application-visible message.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalMessage {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub kind: MessageKind,
    /// Chat `from` tag (`user`/`bot`); `None` for commands and events.
    pub speaker: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Structured command/event payload.
    pub metadata: Option<Value>,
}

impl LogicalMessage {
    /// Message as shown for a locally sent chat.
    pub fn local_chat(id: impl Into<String>, text: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            sender: Sender::Local,
            kind: MessageKind::Chat,
            speaker: Some(speaker.into()),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Command/event notifications are the system category.
    pub fn is_system(&self) -> bool {
        self.kind != MessageKind::Chat
    }

    fn from_notice(id: String, body: Body) -> Self {
        let (kind, text, metadata) = match body {
            Body::Command(cmd) => {
                let text = cmd.msg.clone().unwrap_or_else(|| cmd.cmd.clone());
                (MessageKind::Command, text, serde_json::to_value(&cmd).ok())
            }
            Body::Event(ev) => {
                let text = ev.event.clone();
                (MessageKind::Event, text, serde_json::to_value(&ev).ok())
            }
            Body::Chat(chat) => {
                return Self {
                    id,
                    text: chat.text,
                    sender: Sender::Remote,
                    kind: MessageKind::Chat,
                    speaker: Some(chat.from),
                    timestamp: Utc::now(),
                    metadata: None,
                }
            }
        };
        Self {
            id,
            text,
            sender: Sender::Remote,
            kind,
            speaker: None,
            timestamp: Utc::now(),
            metadata,
        }
    }
}

/// Why a frame produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ignored {
    /// Dropped at the decode boundary.
    Discarded(Discard),
    /// Id or chunk already seen.
    Duplicate,
    /// Chunk for a message that was already dropped.
    Tombstoned,
    /// Chunk index beyond the announced final chunk.
    BeyondFinal,
}

impl Ignored {
    pub fn reason(&self) -> &'static str {
        match self {
            Ignored::Discarded(d) => d.reason(),
            Ignored::Duplicate => "duplicate",
            Ignored::Tombstoned => "tombstoned",
            Ignored::BeyondFinal => "beyond_final",
        }
    }
}

/// Result of feeding one frame.
#[derive(Debug)]
pub enum Outcome {
    /// A logical message is ready for the application.
    Complete(LogicalMessage),
    /// Chunk accepted; message still assembling.
    Pending,
    Ignored(Ignored),
    /// The partial message was dropped; no text is surfaced.
    Dropped(AvatarError),
}

impl Outcome {
    pub fn into_message(self) -> Option<LogicalMessage> {
        match self {
            Outcome::Complete(m) => Some(m),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Partial {
    speaker: String,
    started: DateTime<Utc>,
    last_activity: Instant,
    next_index: u32,
    text: String,
    parked: BTreeMap<u32, String>,
    final_index: Option<u32>,
}

impl Partial {
    fn new(speaker: String, now: Instant) -> Self {
        Self {
            speaker,
            started: Utc::now(),
            last_activity: now,
            next_index: 0,
            text: String::new(),
            parked: BTreeMap::new(),
            final_index: None,
        }
    }

    fn is_complete(&self) -> bool {
        self.final_index.is_some_and(|f| self.next_index > f)
    }

    fn append(&mut self, text: &str) {
        self.text.push_str(text);
        self.next_index += 1;
        while let Some(parked) = self.parked.remove(&self.next_index) {
            self.text.push_str(&parked);
            self.next_index += 1;
        }
    }
}

/// Bounded FIFO set of ids.
#[derive(Debug)]
struct RecentIds {
    cap: usize,
    order: VecDeque<String>,
    set: HashSet<String>,
}

impl RecentIds {
    fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            order: VecDeque::new(),
            set: HashSet::new(),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.set.contains(id)
    }

    /// Returns false if the id was already present.
    fn insert(&mut self, id: &str) -> bool {
        if !self.set.insert(id.to_owned()) {
            return false;
        }
        self.order.push_back(id.to_owned());
        while self.order.len() > self.cap {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        true
    }
}

/// Per-connection reassembler. Owned by a single consumer; not `Sync`-shared.
#[derive(Debug)]
pub struct Reassembler {
    limits: ReassemblyLimits,
    pending: HashMap<String, Partial>,
    surfaced: RecentIds,
    tombstones: RecentIds,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(ReassemblyLimits::default())
    }
}

impl Reassembler {
    pub fn new(limits: ReassemblyLimits) -> Self {
        Self {
            pending: HashMap::new(),
            surfaced: RecentIds::new(limits.recent_ids),
            tombstones: RecentIds::new(limits.recent_ids),
            limits,
        }
    }

    /// Number of messages currently assembling.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Decode raw frame bytes and feed the envelope.
    pub fn ingest(&mut self, frame: &[u8], now: Instant) -> Outcome {
        match decode(frame) {
            Decoded::Envelope(env) => self.feed(env, now),
            Decoded::Discarded(d) => Outcome::Ignored(Ignored::Discarded(d)),
        }
    }

    /// Feed one decoded envelope.
    pub fn feed(&mut self, env: Envelope, now: Instant) -> Outcome {
        let Envelope {
            message_id,
            chunk,
            body,
        } = env;

        match (chunk, body) {
            (Some(mark), Body::Chat(chat)) => self.feed_chunk(message_id, mark, chat.text, chat.from, now),
            // Unchunked chat, commands and events are complete on arrival.
            (_, body) => {
                if !self.surfaced.insert(&message_id) {
                    return Outcome::Ignored(Ignored::Duplicate);
                }
                Outcome::Complete(LogicalMessage::from_notice(message_id, body))
            }
        }
    }

    fn feed_chunk(&mut self, id: String, mark: ChunkMark, text: String, speaker: String, now: Instant) -> Outcome {
        if self.surfaced.contains(&id) {
            return Outcome::Ignored(Ignored::Duplicate);
        }
        if self.tombstones.contains(&id) {
            return Outcome::Ignored(Ignored::Tombstoned);
        }

        if !self.pending.contains_key(&id) && self.pending.len() >= self.limits.max_pending {
            if let Some(stalest) = self.stalest() {
                tracing::warn!(mid = %stalest, "pending message limit reached; dropping stalest partial message");
                self.drop_partial(&stalest);
            }
        }

        let partial = self
            .pending
            .entry(id.clone())
            .or_insert_with(|| Partial::new(speaker, now));
        partial.last_activity = now;

        if mark.is_final {
            let conflicting = match partial.final_index {
                Some(f) => f != mark.index,
                None => partial.next_index > mark.index.saturating_add(1) || partial.parked.keys().any(|&k| k > mark.index),
            };
            if conflicting {
                tracing::warn!(mid = %id, idx = mark.index, "conflicting final chunk; dropping partial message");
                return Outcome::Dropped(self.drop_partial(&id));
            }
            partial.final_index = Some(mark.index);
        }

        if partial.final_index.is_some_and(|f| mark.index > f) {
            return Outcome::Ignored(Ignored::BeyondFinal);
        }
        if mark.index < partial.next_index || partial.parked.contains_key(&mark.index) {
            return Outcome::Ignored(Ignored::Duplicate);
        }

        if mark.index == partial.next_index {
            partial.append(&text);
        } else {
            partial.parked.insert(mark.index, text);
            if partial.parked.len() > self.limits.max_out_of_order {
                tracing::warn!(mid = %id, parked = partial.parked.len(), "out-of-order buffer exceeded; dropping partial message");
                return Outcome::Dropped(self.drop_partial(&id));
            }
        }

        if !partial.is_complete() {
            return Outcome::Pending;
        }

        let Some(done) = self.pending.remove(&id) else {
            return Outcome::Pending;
        };
        self.surfaced.insert(&id);
        Outcome::Complete(LogicalMessage {
            id,
            text: done.text,
            sender: Sender::Remote,
            kind: MessageKind::Chat,
            speaker: Some(done.speaker),
            timestamp: done.started,
            metadata: None,
        })
    }

    /// Drop partial messages idle past the timeout. Returns one gap per drop.
    pub fn sweep(&mut self, now: Instant) -> Vec<AvatarError> {
        let timeout = self.limits.idle_timeout;
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.last_activity) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .map(|id| {
                tracing::debug!(mid = %id, "partial message expired");
                self.drop_partial(&id)
            })
            .collect()
    }

    fn stalest(&self) -> Option<String> {
        self.pending
            .iter()
            .min_by_key(|(_, p)| p.last_activity)
            .map(|(id, _)| id.clone())
    }

    fn drop_partial(&mut self, id: &str) -> AvatarError {
        let next_index = self.pending.remove(id).map(|p| p.next_index).unwrap_or(0);
        self.tombstones.insert(id);
        AvatarError::ReassemblyGap {
            message_id: id.to_owned(),
            next_index,
        }
    }
}
