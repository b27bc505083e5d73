//! Media transport seam.
//!
//! The WebRTC channel is consumed through the [`MediaTransport`] trait; the
//! in-memory [`LoopbackTransport`] backs the binary's echo peer and the tests.

pub mod listeners;
pub mod loopback;
pub mod media;

pub use listeners::{ListenerRegistry, Subscription};
pub use loopback::{LoopbackTrack, LoopbackTransport, SentFrame, TransportCall};
pub use media::{
    EventListener, LocalTrack, MediaKind, MediaTransport, NetworkQuality, RemoteUser, TransportEvent,
};
