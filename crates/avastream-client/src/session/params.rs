use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use avastream_core::error::{AvatarError, Result};
use avastream_core::protocol::envelope::CommandPayload;

use crate::api::types::non_empty;
use crate::config::SessionSection;

pub const SET_PARAMS_CMD: &str = "set-params";
pub const INTERRUPT_CMD: &str = "interrupt";

/// Live-updatable avatar options, pushed as the `set-params` command payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AvatarParams {
    #[serde(rename = "vid", skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(rename = "vurl", skip_serializing_if = "Option::is_none")]
    pub voice_url: Option<String>,
    #[serde(rename = "lang", skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u8>,
    #[serde(rename = "bgurl", skip_serializing_if = "Option::is_none")]
    pub background_url: Option<String>,
    #[serde(rename = "vparams", skip_serializing_if = "BTreeMap::is_empty")]
    pub voice_params: BTreeMap<String, Value>,
}

impl AvatarParams {
    pub fn from_config(s: &SessionSection) -> Self {
        Self {
            voice_id: non_empty(&s.voice_id),
            voice_url: non_empty(&s.voice_url),
            language: non_empty(&s.language),
            mode: s.mode.filter(|m| *m > 0),
            background_url: non_empty(&s.background_url),
            voice_params: s.voice_params.clone(),
        }
    }

    pub fn to_command(&self) -> Result<CommandPayload> {
        let data = serde_json::to_value(self)
            .map_err(|e| AvatarError::Encoding(format!("set-params payload: {e}")))?;
        Ok(CommandPayload::request(SET_PARAMS_CMD, Some(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_options_are_omitted() {
        let section = SessionSection {
            voice_id: Some("v-1".into()),
            language: Some("  ".into()),
            mode: Some(2),
            ..SessionSection::default()
        };
        let cmd = AvatarParams::from_config(&section).to_command().unwrap();
        assert_eq!(cmd.cmd, "set-params");
        assert_eq!(cmd.data, Some(serde_json::json!({"vid": "v-1", "mode": 2})));
    }
}
