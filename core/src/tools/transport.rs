//! HTTP seam between the facades and the public map/weather APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::error::{ToolError, ToolResult};
use crate::{GeomapError, Result};

pub const DEFAULT_USER_AGENT: &str = "geomap-agent/0.1";

/// Issue one GET request and return the decoded JSON body.
///
/// Implementations classify failures: 4xx and unparseable bodies are
/// `UpstreamRejected`, 5xx and network errors are `UpstreamUnavailable`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> ToolResult<Value>;
}

/// `reqwest`-backed transport shared by all facades
#[derive(Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(timeout_ms: u64, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .user_agent(user_agent)
            .build()
            .map_err(|e| GeomapError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> ToolResult<Value> {
        debug!(target: "http_transport", url = %url, params = query.len(), "GET");

        let resp = self.http.get(url).query(query).send().await.map_err(|e| {
            warn!(target: "http_transport", url = %url, error = %e, "Request failed");
            if e.is_timeout() {
                ToolError::UpstreamUnavailable(format!("request to {url} timed out"))
            } else {
                ToolError::UpstreamUnavailable(format!("request to {url} failed: {e}"))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(target: "http_transport", url = %url, %status, "Upstream returned error status");
            return Err(classify_status(status, &body));
        }

        resp.json::<Value>().await.map_err(|e| {
            warn!(target: "http_transport", url = %url, error = %e, "Failed to parse response body");
            ToolError::UpstreamRejected(format!("response from {url} is not valid JSON: {e}"))
        })
    }
}

fn classify_status(status: StatusCode, body: &str) -> ToolError {
    let snippet: String = body.chars().take(200).collect();
    if status.is_client_error() {
        ToolError::UpstreamRejected(format!("status {status}: {snippet}"))
    } else {
        ToolError::UpstreamUnavailable(format!("status {status}: {snippet}"))
    }
}

/// Decode a JSON body into the facade's expected shape. Missing or mistyped
/// fields mean the upstream answered with something we cannot use.
pub(crate) fn decode_body<T: serde::de::DeserializeOwned>(body: Value, what: &str) -> ToolResult<T> {
    serde_json::from_value(body)
        .map_err(|e| ToolError::UpstreamRejected(format!("unexpected {what} response: {e}")))
}
