use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::core::error::{SyncError, SyncResult};
use crate::core::http::build_http_client;

/// Network collaborator: GET a URL, return the whole body.
///
/// Non-success statuses must surface as errors so callers can move on to the
/// next candidate.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str) -> SyncResult<Vec<u8>>;
}

/// `reqwest`-backed transport. Every request carries the client timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> SyncResult<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        debug!("Fetched {} ({} bytes)", url, bytes.len());
        Ok(bytes.to_vec())
    }
}
