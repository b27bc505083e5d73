//! In-process client metrics.
//!
//! Counters and histograms live in atomics behind `DashMap` label maps and can
//! be rendered in Prometheus text format by the host application.

pub mod metrics;

pub use metrics::ClientMetrics;
