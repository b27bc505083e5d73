//! avastream client runtime.
//!
//! Wires the session API, the media transport, the pacer and the inbound
//! reassembly pump into one [`AvatarSession`] handle. Consumed by the
//! `avastream` binary and by the integration tests.

pub mod api;
pub mod config;
pub mod obs;
pub mod pacing;
pub mod session;
pub mod transport;

pub use session::{AvatarParams, AvatarSession, SessionState};
