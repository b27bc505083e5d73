use async_trait::async_trait;
use serde_json::json;

use avastream_core::error::{AvatarError, Result};

use super::types::{parse_close_reply, parse_create_reply, SessionRecord, SessionRequest};
use super::SessionApi;
use crate::config::ApiSection;

const CREATE_PATH: &str = "/api/open/v4/liveAvatar/session/create";
const CLOSE_PATH: &str = "/api/open/v4/liveAvatar/session/close";

/// Session API over HTTPS with bearer-token auth.
#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    client: reqwest::Client,
    host: String,
    token: String,
}

impl HttpSessionApi {
    pub fn new(api: &ApiSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AvatarError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            host: api.host.trim_end_matches('/').to_owned(),
            token: api.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    async fn post(&self, path: &str, body: &impl serde::Serialize) -> Result<bytes::Bytes> {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| AvatarError::SessionApi(format!("POST {path} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AvatarError::SessionApi(format!("POST {path} returned {status}")));
        }

        resp.bytes()
            .await
            .map_err(|e| AvatarError::SessionApi(format!("POST {path} body read failed: {e}")))
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn create_session(&self, req: &SessionRequest) -> Result<SessionRecord> {
        let body = self.post(CREATE_PATH, req).await?;
        let record = parse_create_reply(&body)?;
        tracing::info!(session_id = %record.session_id, channel = %record.credentials.channel, "remote session created");
        Ok(record)
    }

    async fn close_session(&self, session_id: &str) -> Result<()> {
        let body = self.post(CLOSE_PATH, &json!({ "id": session_id })).await?;
        parse_close_reply(&body)?;
        tracing::info!(%session_id, "remote session closed");
        Ok(())
    }
}
