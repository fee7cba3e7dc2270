//! Peer Client
//!
//! HTTP client used to pull pages from other instances.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::sync::Page;

/// HTTP client for fetching sync pages from peers
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    /// Request timeout
    request_timeout: Duration,
}

impl PeerClient {
    /// Create a new peer client
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(concat!("tablesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            request_timeout,
        })
    }

    /// Fetch and decode one page.
    ///
    /// The body is decoded whatever the HTTP status, so a peer's rejection
    /// reaches the caller as an unsuccessful page.
    pub async fn fetch_page(&self, url: &str) -> Result<Page> {
        let response = self.http.get(url).send().await.map_err(|e| Error::Transport {
            url: url.to_string(),
            reason: if e.is_timeout() {
                format!("timed out after {:?}", self.request_timeout)
            } else {
                e.to_string()
            },
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| Error::Transport {
            url: url.to_string(),
            reason: format!("failed to read response body: {}", e),
        })?;

        serde_json::from_slice(&body).map_err(|e| Error::Transport {
            url: url.to_string(),
            reason: format!("undecodable response (HTTP {}): {}", status, e),
        })
    }

    /// Request timeout applied to every fetch
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = PeerClient::new(Duration::from_secs(5), Duration::from_secs(10)).unwrap();
        assert_eq!(client.request_timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let client = PeerClient::new(Duration::from_millis(100), Duration::from_millis(500)).unwrap();

        // Nothing listens on port 9 locally
        let result = client
            .fetch_page("http://127.0.0.1:9/api/sync/mempool?last=0&skip=0&take=10")
            .await;
        assert!(matches!(result, Err(Error::Transport { .. })));
        assert!(result.unwrap_err().is_retryable());
    }
}
