//! Top-level facade crate for avastream.
//!
//! Re-exports the protocol core and the session client so users can depend on a single crate.

pub mod core {
    pub use avastream_core::*;
}

pub mod client {
    pub use avastream_client::*;
}
