//! Session lifecycle: remote session, channel membership, data path.

pub mod history;
pub mod orchestrator;
pub mod params;
mod pump;
pub mod state;

pub use history::MessageLog;
pub use orchestrator::AvatarSession;
pub use params::AvatarParams;
pub use state::SessionState;
