/// Lifecycle of one avatar session.
///
/// `Idle -> Joining -> Joined -> Active -> Closing -> Idle`; any failure on
/// the way up goes through `Closing` back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    /// Remote session being created and channel being joined.
    Joining,
    /// Channel joined, inbound listener registered.
    Joined,
    /// Initial parameters pushed; chat and commands accepted.
    Active,
    Closing,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Joining => "joining",
            SessionState::Joined => "joined",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
        }
    }

    /// Channel membership is held.
    pub fn is_connected(self) -> bool {
        matches!(self, SessionState::Joined | SessionState::Active)
    }
}
