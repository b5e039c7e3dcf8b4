use std::time::Duration;

use angmon_core::ValidConfig;
use angmon_proto::{Configuration, MetricsSnapshot};
use bytes::Bytes;
use http::{Method, StatusCode, header};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::http_util;

/// Client for the agent's HTTP surface.
#[derive(Clone, Debug)]
pub struct AgentClient {
    addr: String,
    tls: bool,
    prefer_ipv6: bool,
    timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent unreachable: {0:#}")]
    Transport(anyhow::Error),
    #[error("agent did not answer within {0:?}")]
    Timeout(Duration),
    #[error("agent answered [{0}] {1}")]
    Status(StatusCode, String),
    #[error("unexpected payload from agent: {0}")]
    Decode(#[from] serde_json::Error),
}

impl AgentClient {
    pub fn new(addr: impl Into<String>, tls: bool, prefer_ipv6: bool, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            tls,
            prefer_ipv6,
            timeout,
        }
    }

    /// `GET /stats`
    pub async fn fetch_stats(&self) -> Result<MetricsSnapshot, AgentError> {
        self.get_json("/stats").await
    }

    /// `GET /load-config`
    pub async fn load_config(&self) -> Result<Configuration, AgentError> {
        self.get_json("/load-config").await
    }

    /// `POST /config`. Only the status code matters, the body is ignored.
    pub async fn save_config(&self, config: &ValidConfig) -> Result<(), AgentError> {
        let body = Bytes::from(serde_json::to_vec(config)?);
        self.send(Method::POST, "/config", body).await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AgentError> {
        let body = self.send(Method::GET, path, Bytes::new()).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send(&self, method: Method, path: &str, body: Bytes) -> Result<Bytes, AgentError> {
        let uri = format!(
            "{}://{}{path}",
            if self.tls { "https" } else { "http" },
            self.addr
        );
        debug!(%method, %uri, "calling agent");

        let request = async {
            let mut builder = http_util::basic_request_builder(&uri, method)?;
            if !body.is_empty() {
                builder = builder
                    .header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                    .header(header::CONTENT_LENGTH, body.len());
            }
            http_util::send_http_request(builder.body(body)?, self.tls, self.prefer_ipv6).await
        };

        let resp = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| AgentError::Timeout(self.timeout))?
            .map_err(AgentError::Transport)?;

        if !resp.status().is_success() {
            return Err(AgentError::Status(
                resp.status(),
                String::from_utf8_lossy(resp.body()).into_owned(),
            ));
        }

        Ok(resp.into_body())
    }
}
