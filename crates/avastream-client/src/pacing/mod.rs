//! Outbound pacing: byte-rate budget plus the frame sender built on it.

pub mod pacer;
pub mod sender;

pub use pacer::RatePacer;
pub use sender::FrameSender;
