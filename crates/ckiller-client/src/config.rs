//! Client configuration.

use std::time::Duration;

use crate::push::{ReconnectConfig, RetryBudget};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL, without a trailing slash
    pub base_url: String,
    /// Delay between status polls outside the push phase
    pub poll_interval: Duration,
    /// Timeout for non-streaming requests
    pub request_timeout: Duration,
    pub retry_budget: RetryBudget,
    pub reconnect: ReconnectConfig,
    /// Consecutive failed polls tolerated before giving up
    pub max_poll_failures: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            retry_budget: RetryBudget::default(),
            reconnect: ReconnectConfig::default(),
            max_poll_failures: 10,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("CKILLER_API_URL")
                .unwrap_or(defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            poll_interval: std::env::var("CKILLER_POLL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            request_timeout: std::env::var("CKILLER_REQUEST_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            retry_budget: std::env::var("CKILLER_SSE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retry_budget),
            reconnect: defaults.reconnect,
            max_poll_failures: std::env::var("CKILLER_MAX_POLL_FAILURES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_poll_failures),
        }
    }

    /// Config with short delays pointing at `base_url`, for tests.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_millis(10),
            request_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                multiplier: 2.0,
            },
            ..Default::default()
        }
    }
}
