// Origin proxy
//
// Stateless HTTP client for fetching bytes from an origin. One request per
// call: no retry, no caching. Retry policy belongs to the origin tier and
// caching to the tiers above it.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::trace;

use crate::error::ProxyError;

/// Transport capability used to reach origins
#[async_trait]
pub trait OriginProxy: Send + Sync {
    /// Download `{base_url}/{file}` in full
    async fn download(&self, base_url: &str, file: &str) -> Result<Bytes, ProxyError>;
}

/// Join an origin base URL and a file name with exactly one slash
#[must_use]
pub fn origin_file_url(base_url: &str, file: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        file.trim_start_matches('/')
    )
}

/// reqwest-backed origin client
#[derive(Clone)]
pub struct HttpOriginProxy {
    client: reqwest::Client,
}

impl HttpOriginProxy {
    /// Build a client whose requests give up after `request_timeout`
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;
        Ok(Self { client })
    }

    /// Shared client, reused by the notify-origin escalation policy
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl OriginProxy for HttpOriginProxy {
    async fn download(&self, base_url: &str, file: &str) -> Result<Bytes, ProxyError> {
        let url = origin_file_url(base_url, file);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProxyError::Transport(format!("GET {url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProxyError::NotFound(url));
        }
        if !status.is_success() {
            return Err(ProxyError::Transport(format!("GET {url}: status {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::Transport(format!("GET {url}: reading body: {e}")))?;

        trace!(url = %url, bytes = body.len(), "Downloaded from origin");
        Ok(body)
    }
}
