use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use avastream_core::error::{AvatarError, Result};
use avastream_core::protocol::envelope::MAX_FRAME_BYTES;
use avastream_core::ReassemblyLimits;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub protocol: ProtocolSection,

    #[serde(default)]
    pub lifecycle: LifecycleSection,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: 1,
            api: ApiSection::default(),
            session: SessionSection::default(),
            protocol: ProtocolSection::default(),
            lifecycle: LifecycleSection::default(),
        }
    }
}

impl ClientConfig {
    /// Range checks; run right after parsing.
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(AvatarError::Configuration(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.session.validate()?;
        self.protocol.validate()?;
        self.lifecycle.validate(&self.protocol)?;

        Ok(())
    }

    /// Fields a session start cannot do without. Checked before any network call.
    pub fn require_credentials(&self) -> Result<()> {
        if self.api.host.trim().is_empty() {
            return Err(AvatarError::Configuration("api.host is required".into()));
        }
        if self.api.token.trim().is_empty() {
            return Err(AvatarError::Configuration("api.token is required".into()));
        }
        if self.session.avatar_id.trim().is_empty() {
            return Err(AvatarError::Configuration("session.avatar_id is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiSection {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub token: String,
}

/// Avatar options sent once at session creation and pushed with `set-params`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    #[serde(default)]
    pub avatar_id: String,

    #[serde(default = "default_duration_secs")]
    pub duration_secs: u32,

    #[serde(default)]
    pub knowledge_id: Option<String>,

    #[serde(default)]
    pub voice_id: Option<String>,

    #[serde(default)]
    pub voice_url: Option<String>,

    #[serde(default)]
    pub language: Option<String>,

    /// 1 = retelling, 2 = dialogue.
    #[serde(default)]
    pub mode: Option<u8>,

    #[serde(default)]
    pub background_url: Option<String>,

    #[serde(default)]
    pub voice_params: BTreeMap<String, serde_json::Value>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            avatar_id: String::new(),
            duration_secs: default_duration_secs(),
            knowledge_id: None,
            voice_id: None,
            voice_url: None,
            language: None,
            mode: None,
            background_url: None,
            voice_params: BTreeMap::new(),
        }
    }
}

impl SessionSection {
    pub fn validate(&self) -> Result<()> {
        if let Some(mode) = self.mode {
            if !(1..=2).contains(&mode) {
                return Err(AvatarError::Configuration(
                    "session.mode must be 1 (retelling) or 2 (dialogue)".into(),
                ));
            }
        }
        if self.duration_secs > 3600 {
            return Err(AvatarError::Configuration(
                "session.duration_secs must be at most 3600".into(),
            ));
        }
        Ok(())
    }
}

fn default_duration_secs() -> u32 {
    600
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolSection {
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default = "default_bytes_per_sec")]
    pub bytes_per_sec: usize,

    #[serde(default = "default_reassembly_timeout_ms")]
    pub reassembly_timeout_ms: u64,

    #[serde(default = "default_max_out_of_order_chunks")]
    pub max_out_of_order_chunks: usize,

    #[serde(default = "default_max_pending_messages")]
    pub max_pending_messages: usize,

    #[serde(default = "default_system_history")]
    pub system_history: usize,
}

impl Default for ProtocolSection {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            bytes_per_sec: default_bytes_per_sec(),
            reassembly_timeout_ms: default_reassembly_timeout_ms(),
            max_out_of_order_chunks: default_max_out_of_order_chunks(),
            max_pending_messages: default_max_pending_messages(),
            system_history: default_system_history(),
        }
    }
}

impl ProtocolSection {
    pub fn validate(&self) -> Result<()> {
        if !(128..=65536).contains(&self.max_frame_bytes) {
            return Err(AvatarError::Configuration(
                "protocol.max_frame_bytes must be between 128 and 65536".into(),
            ));
        }
        if self.bytes_per_sec < self.max_frame_bytes {
            return Err(AvatarError::Configuration(
                "protocol.bytes_per_sec must be at least max_frame_bytes".into(),
            ));
        }
        if !(1000..=600000).contains(&self.reassembly_timeout_ms) {
            return Err(AvatarError::Configuration(
                "protocol.reassembly_timeout_ms must be between 1000 and 600000".into(),
            ));
        }
        if self.max_out_of_order_chunks == 0 || self.max_pending_messages == 0 {
            return Err(AvatarError::Configuration(
                "protocol reassembly bounds must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn reassembly_limits(&self) -> ReassemblyLimits {
        ReassemblyLimits {
            idle_timeout: Duration::from_millis(self.reassembly_timeout_ms),
            max_out_of_order: self.max_out_of_order_chunks,
            max_pending: self.max_pending_messages,
            ..ReassemblyLimits::default()
        }
    }
}

fn default_max_frame_bytes() -> usize {
    MAX_FRAME_BYTES
}
fn default_bytes_per_sec() -> usize {
    6000
}
fn default_reassembly_timeout_ms() -> u64 {
    60000
}
fn default_max_out_of_order_chunks() -> usize {
    64
}
fn default_max_pending_messages() -> usize {
    128
}
fn default_system_history() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleSection {
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    #[serde(default = "default_gc_interval_ms")]
    pub gc_interval_ms: u64,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            join_timeout_ms: default_join_timeout_ms(),
            gc_interval_ms: default_gc_interval_ms(),
        }
    }
}

impl LifecycleSection {
    pub fn validate(&self, protocol: &ProtocolSection) -> Result<()> {
        if !(1000..=120000).contains(&self.join_timeout_ms) {
            return Err(AvatarError::Configuration(
                "lifecycle.join_timeout_ms must be between 1000 and 120000".into(),
            ));
        }
        if self.gc_interval_ms < 100 {
            return Err(AvatarError::Configuration(
                "lifecycle.gc_interval_ms must be at least 100".into(),
            ));
        }
        if self.gc_interval_ms >= protocol.reassembly_timeout_ms {
            return Err(AvatarError::Configuration(
                "lifecycle.gc_interval_ms must be smaller than protocol.reassembly_timeout_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }
}

fn default_join_timeout_ms() -> u64 {
    30000
}
fn default_gc_interval_ms() -> u64 {
    5000
}
