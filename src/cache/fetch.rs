//! Network access for the cache manager.

use std::time::Duration;

use async_trait::async_trait;

use super::store::CachedResponse;
use crate::error::Result;

/// Fetches a path from the network.
///
/// Any response the server produced is `Ok`, whatever its status; only a
/// transport failure is an error.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<CachedResponse>;
}

/// Fetches over HTTP from a fixed origin.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: String,
}

impl HttpFetcher {
    /// Creates a fetcher resolving paths against `origin`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(origin: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self::with_client(client, origin))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, origin: impl Into<String>) -> Self {
        Self {
            client,
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.origin)
        } else {
            format!("{}/{path}", self.origin)
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<CachedResponse> {
        let response = self.client.get(self.url(path)).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        Ok(CachedResponse {
            status,
            content_type,
            body,
        })
    }
}
