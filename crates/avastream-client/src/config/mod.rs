//! Client config loader (strict parsing).

pub mod schema;

use std::fs;

use avastream_core::error::{AvatarError, Result};

pub use schema::{ApiSection, ClientConfig, LifecycleSection, ProtocolSection, SessionSection};

pub fn load_from_file(path: &str) -> Result<ClientConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| AvatarError::Configuration(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ClientConfig> {
    let cfg: ClientConfig = serde_yaml::from_str(s)
        .map_err(|e| AvatarError::Configuration(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
