//! Remote session API (HTTP).
//!
//! The avatar service issues one session record per start: a session id plus
//! the media-channel credentials used to join. The orchestrator only sees the
//! [`SessionApi`] trait so tests and alternative backends can stand in.

pub mod http;
pub mod types;

use async_trait::async_trait;

use avastream_core::error::Result;

pub use http::HttpSessionApi;
pub use types::{Credentials, SessionRecord, SessionRequest};

#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn create_session(&self, req: &SessionRequest) -> Result<SessionRecord>;
    async fn close_session(&self, session_id: &str) -> Result<()>;
}
