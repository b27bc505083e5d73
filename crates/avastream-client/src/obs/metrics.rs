//! Labeled counters/histograms for the data channel and session lifecycle.
//!
//! Labels are flattened into sorted key vectors so rendering order is stable.
//! Histogram buckets are fixed in milliseconds; pacing waits range from zero to
//! a full rate window.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn render_labels(key: &LabelKey) -> String {
    key.iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

/// `name{labels}`, or bare `name` for an empty label set.
fn series(name: &str, labels: &str) -> String {
    if labels.is_empty() {
        name.to_owned()
    } else {
        format!("{}{{{}}}", name, labels)
    }
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for an exact label set (0 if never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sum across every label set.
    pub fn total(&self) -> u64 {
        self.map.iter().map(|r| r.value().load(Ordering::Relaxed)).sum()
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} counter", name);
        for r in self.map.iter() {
            let val = r.value().load(Ordering::Relaxed);
            let _ = writeln!(out, "{} {}", series(name, &render_labels(r.key())), val);
        }
    }
}

// 0ms, 10ms, 50ms, 100ms, 250ms, 500ms, 1s, 2s
const BUCKETS_MILLIS: [u64; 8] = [0, 10, 50, 100, 250, 500, 1_000, 2_000];

#[derive(Default)]
struct AtomicHistogram {
    count: AtomicU64,
    sum: AtomicU64,
    buckets: [AtomicU64; BUCKETS_MILLIS.len()],
}

#[derive(Default)]
pub struct HistogramVec {
    map: DashMap<LabelKey, AtomicHistogram>,
}

impl HistogramVec {
    pub fn observe(&self, labels: &[(&str, &str)], d: Duration) {
        let hist = self.map.entry(label_key(labels)).or_default();
        let millis = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum.fetch_add(millis, Ordering::Relaxed);
        for (i, &le) in BUCKETS_MILLIS.iter().enumerate() {
            if millis <= le {
                hist.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|h| h.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} histogram", name);
        for r in self.map.iter() {
            let labels = render_labels(r.key());
            let hist = r.value();
            let prefix = if labels.is_empty() { String::new() } else { format!("{},", labels) };

            for (i, &le) in BUCKETS_MILLIS.iter().enumerate() {
                let n = hist.buckets[i].load(Ordering::Relaxed);
                let _ = writeln!(out, "{}_bucket{{{}le=\"{}\"}} {}", name, prefix, le, n);
            }
            let count = hist.count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", name, prefix, count);
            let sum = hist.sum.load(Ordering::Relaxed);
            let _ = writeln!(out, "{} {}", series(&format!("{name}_sum"), &labels), sum);
            let _ = writeln!(out, "{} {}", series(&format!("{name}_count"), &labels), count);
        }
    }
}

#[derive(Default)]
pub struct ClientMetrics {
    /// Frames handed to the transport, by message type.
    pub frames_sent: CounterVec,
    pub bytes_sent: CounterVec,
    /// Time spent waiting for the byte budget.
    pub pacing_delay: HistogramVec,
    /// Sends that failed at the transport, by message type.
    pub send_failures: CounterVec,
    /// Inbound frames dropped at decode, by reason.
    pub frames_discarded: CounterVec,
    /// Inbound frames ignored by reassembly, by reason.
    pub frames_ignored: CounterVec,
    pub messages_assembled: CounterVec,
    pub reassembly_dropped: CounterVec,
    /// Lifecycle state entries, by state.
    pub session_transitions: CounterVec,
    pub api_calls: CounterVec,
}

impl ClientMetrics {
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.frames_sent.render("avastream_frames_sent_total", &mut out);
        self.bytes_sent.render("avastream_bytes_sent_total", &mut out);
        self.pacing_delay.render("avastream_pacing_delay_millis", &mut out);
        self.send_failures.render("avastream_send_failures_total", &mut out);
        self.frames_discarded.render("avastream_frames_discarded_total", &mut out);
        self.frames_ignored.render("avastream_frames_ignored_total", &mut out);
        self.messages_assembled.render("avastream_messages_assembled_total", &mut out);
        self.reassembly_dropped.render("avastream_reassembly_dropped_total", &mut out);
        self.session_transitions.render("avastream_session_transitions_total", &mut out);
        self.api_calls.render("avastream_api_calls_total", &mut out);
        out
    }
}
