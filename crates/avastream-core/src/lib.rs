//! avastream core: transport-agnostic data-channel protocol primitives.
//!
//! This crate defines the wire envelope, the chunker that keeps frames under
//! the data-channel size ceiling, the reassembler that rebuilds logical
//! messages, and the error surface shared with the session client. It carries
//! no runtime dependencies so it can be driven by any event loop.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Inbound bytes from the peer are never trusted: malformed frames are
//! discarded at the decode boundary instead of surfacing as errors.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{AvatarError, ErrorCode, Result};
pub use protocol::{
    chunker::split,
    envelope::{decode, encode, Body, Decoded, Discard, Envelope, MessageKind},
    reassembly::{Ignored, LogicalMessage, Outcome, Reassembler, ReassemblyLimits, Sender},
};
