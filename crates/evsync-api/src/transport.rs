// Shared transport configuration for building reqwest::Client instances.
//
// The cloud and local clients share timeout, retry, and user-agent settings
// through this module instead of duplicating builder logic.

use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::error::Error;
use crate::retry::RetryPolicy;

const USER_AGENT: &str = concat!("evsync/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Hard ceiling per attempt.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Defaults for a device's local endpoint: short timeout, 1.5 s linear backoff.
    pub fn local() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::local(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.build_client_with_headers(HeaderMap::new())
    }

    /// Build a `reqwest::Client` with additional default headers.
    ///
    /// Used by the cloud client to inject the `apikey` header.
    pub fn build_client_with_headers(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Client(format!("failed to build HTTP client: {e}")))
    }
}
