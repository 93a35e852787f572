//! Startup configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file,
//! a `.env` file in the working directory, then the process environment.
//!
//! ```toml
//! [airflow]
//! base_url = "http://airflow:8080/api/v1"
//! username = "admin"
//! password = "admin"
//!
//! [web]
//! port = 8800
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use dagctl_adapters::ClientConfig;
use dagctl_web::WebConfig;

/// Environment variables read at startup.
pub const ENV_AIRFLOW_API: &str = "AIRFLOW_API";
pub const ENV_AIRFLOW_USER: &str = "AIRFLOW_USER";
pub const ENV_AIRFLOW_PASS: &str = "AIRFLOW_PASS";
pub const ENV_BIND: &str = "DAGCTL_BIND";
pub const ENV_PORT: &str = "DAGCTL_PORT";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub airflow: ClientConfig,
    pub web: WebConfig,
}

impl AppConfig {
    /// Load the full configuration stack.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        // Existing variables win over `.env` entries.
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "failed to load .env"),
        }

        config.apply_env(env_non_empty)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay variables produced by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_AIRFLOW_API) {
            self.airflow.base_url = url;
        }
        if let Some(user) = lookup(ENV_AIRFLOW_USER) {
            self.airflow.username = user;
        }
        if let Some(pass) = lookup(ENV_AIRFLOW_PASS) {
            self.airflow.password = pass;
        }
        if let Some(bind) = lookup(ENV_BIND) {
            self.web.bind_addr = bind;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.web.port = port
                .parse()
                .with_context(|| format!("{ENV_PORT} must be a port number, got `{port}`"))?;
        }
        Ok(())
    }
}

/// Read a non-empty environment variable, returning `None` if unset or empty.
fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
