//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{AdapterError, Result};

/// Connection, credential and retry settings for [`crate::AirflowClient`].
///
/// Every field has a default so a partial TOML table deserializes cleanly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the Airflow stable REST API, e.g. `http://host:8080/api/v1`.
    pub base_url: String,
    /// Basic-auth user.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
    /// Fixed per-request timeout.
    pub timeout_secs: u64,
    /// Cap on concurrent outbound calls across all in-flight queries.
    pub max_connections: usize,
    /// Total attempts per call, first try included.
    pub max_attempts: u32,
    /// Backoff before retry `i` is `backoff_base_ms * 2^i`.
    pub backoff_base_ms: u64,
    /// Page size used by exhaustive pagination.
    pub page_size: usize,
    /// Pause between successive page requests.
    pub page_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v1".into(),
            username: "admin".into(),
            password: "admin".into(),
            timeout_secs: 60,
            max_connections: 100,
            max_attempts: 3,
            backoff_base_ms: 1_000,
            page_size: 100,
            page_delay_ms: 50,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for `base_url` with default credentials and policy.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set basic-auth credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Check the settings and normalize the base URL.
    pub fn validate(mut self) -> Result<Self> {
        let trimmed = self.base_url.trim().trim_end_matches('/').to_string();
        url::Url::parse(&trimmed)
            .map_err(|e| AdapterError::Config(format!("invalid base_url `{trimmed}`: {e}")))?;
        self.base_url = trimmed;

        if self.max_attempts == 0 {
            return Err(AdapterError::Config("max_attempts must be at least 1".into()));
        }
        if self.page_size == 0 {
            return Err(AdapterError::Config("page_size must be at least 1".into()));
        }
        if self.max_connections == 0 {
            return Err(AdapterError::Config("max_connections must be at least 1".into()));
        }
        Ok(self)
    }

    /// Delay slept after failed attempt `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << attempt.min(16)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}
