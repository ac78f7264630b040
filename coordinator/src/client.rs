//! Token client used by load generators

use std::time::Duration;

use connbench_core::{BenchError, BenchResult, StartToken};

/// Default request timeout for token fetches
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches start tokens from a coordinator
///
/// Every failure, whether transport, status or decoding, is reported as
/// coordinator unavailability.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    url: String,
}

impl TokenClient {
    /// Client for the given token URL (e.g. `http://coordinator:8099/getToken`)
    pub fn new(url: impl Into<String>) -> BenchResult<Self> {
        Self::with_timeout(url, DEFAULT_FETCH_TIMEOUT)
    }

    /// Client with a custom request timeout
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> BenchResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BenchError::coordinator(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// Token URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch one token
    pub async fn fetch(&self) -> BenchResult<StartToken> {
        let unavailable = |e: reqwest::Error| BenchError::coordinator(format!("{}: {e}", self.url));

        let token: StartToken = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        tracing::info!(
            url = %self.url,
            client_start = token.client_start,
            time_start = token.time_start,
            "Received start token"
        );
        Ok(token)
    }
}
