//! Feed retrieval.

use std::time::Duration;

use metar_core::{CacheConfig, MetarError, NetworkError, ReqwestErrorExt};
use reqwest::Client;
use thiserror::Error;

use crate::parse::{parse_feed, ParseError};
use crate::retry::{with_retry, RetryConfig};
use crate::types::AirportData;

/// Why a single retrieval attempt failed
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Network(#[from] NetworkError),

    #[error("Unusable feed: {0}")]
    Parse(#[from] ParseError),
}

impl FetchError {
    pub fn user_message(&self) -> &'static str {
        match self {
            FetchError::Network(e) => e.user_message(),
            FetchError::Parse(_) => "The METAR feed returned data that is not a METAR table.",
        }
    }
}

/// HTTP client for the METAR CSV feed.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
    url: String,
    retry: RetryConfig,
}

impl FeedClient {
    /// Build a client from cache settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &CacheConfig) -> Result<Self, MetarError> {
        Self::with_retry(&config.feed_url, config.fetch_timeout(), RetryConfig::from(config))
    }

    /// Build a client for an explicit URL and retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_retry(url: &str, timeout: Duration, retry: RetryConfig) -> Result<Self, MetarError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("metar-feed/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MetarError::Network(e.into_network_error()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            retry,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// One retrieval attempt: request, full body read and parse.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-success status, body read errors and
    /// responses without a header line.
    pub async fn fetch_once(&self) -> Result<Vec<AirportData>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| e.into_network_error())?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::ServerError {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown status").to_string(),
            }
            .into());
        }

        let body = response.bytes().await.map_err(|e| e.into_network_error())?;
        Ok(parse_feed(&body)?)
    }

    /// Retrieve and parse the feed, retrying per the configured policy.
    ///
    /// Returns `None` once every attempt has failed; the failures are
    /// logged, not returned.
    pub async fn fetch(&self) -> Option<Vec<AirportData>> {
        match with_retry(&self.retry, move || self.fetch_once()).await {
            Ok(batch) => Some(batch),
            Err(e) => {
                tracing::error!(
                    url = %self.url,
                    "Giving up on feed this cycle: {} ({})",
                    e.user_message(),
                    e
                );
                None
            }
        }
    }
}
