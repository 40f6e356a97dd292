//! Transports that retrieve raw vocabulary bytes

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::config::TokenizerConfig;
use crate::error::{TokenizerError, TokenizerResult};

/// Retrieves the body behind a vocabulary URL
#[async_trait]
pub trait VocabularySource: Send + Sync {
    async fn fetch(&self, url: &str) -> TokenizerResult<Bytes>;
}

/// Plain HTTPS GET, no authentication
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(config: &TokenizerConfig) -> TokenizerResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TokenizerError::configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VocabularySource for HttpSource {
    async fn fetch(&self, url: &str) -> TokenizerResult<Bytes> {
        debug!(url, "requesting vocabulary");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TokenizerError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenizerError::network(url, format!("HTTP {}", status)));
        }

        response.bytes().await.map_err(|e| TokenizerError::network(url, e))
    }
}

/// Serves preloaded bodies by URL.
///
/// Useful for air-gapped deployments that ship vocabulary files alongside the
/// binary, and for exercising the fetcher without a network. Unknown URLs fail
/// with [`TokenizerError::Network`], as an unreachable host would.
#[derive(Debug, Default)]
pub struct StaticSource {
    bodies: HashMap<String, Bytes>,
    requests: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: serve `body` for `url`
    pub fn with_body(mut self, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }

    /// Number of fetches attempted so far, including failed ones
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl VocabularySource for StaticSource {
    async fn fetch(&self, url: &str) -> TokenizerResult<Bytes> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| TokenizerError::network(url, "no such resource"))
    }
}
