//! Data-channel protocol modules.
//!
//! - `envelope`: versioned JSON envelope codec (chat / command / event).
//! - `chunker`: splits chat payloads that exceed the frame ceiling.
//! - `reassembly`: rebuilds logical messages from chunks in any arrival order.
//!
//! Inbound parsing is panic-free: anything the peer sends that is not a
//! version 2 envelope is discarded at the boundary and never reaches callers
//! as an error.

pub mod chunker;
pub mod envelope;
pub mod reassembly;
