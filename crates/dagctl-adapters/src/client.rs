//! Resilient Airflow REST client.
//!
//! [`AirflowClient`] is the single resource handle for all upstream traffic.
//! It is built once at startup, shared by reference, and released with
//! [`AirflowClient::close`].  Every call is authenticated with the configured
//! basic-auth credentials, bounded by the fixed request timeout, and gated by
//! a semaphore that caps concurrent outbound calls across all queries.
//!
//! Retry policy: up to `max_attempts` tries, sleeping `backoff_base * 2^i`
//! after failed attempt `i`.  Network errors, non-2xx statuses and malformed
//! bodies are all retried alike; a 4xx is not special-cased.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::{AdapterError, Result};

/// User agent sent with every request.
const USER_AGENT: &str = concat!("dagctl/", env!("CARGO_PKG_VERSION"));

/// Authenticated HTTP client with bounded retry and exhaustive pagination.
pub struct AirflowClient {
    config: ClientConfig,
    http: reqwest::Client,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl AirflowClient {
    /// Build the client and its connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] for an invalid configuration or if the
    /// underlying HTTP client cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let config = config.validate()?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout())
            .pool_max_idle_per_host(config.max_connections)
            .build()
            .map_err(|e| AdapterError::Config(format!("failed to build HTTP client: {e}")))?;

        info!(
            base_url = %config.base_url,
            max_connections = config.max_connections,
            timeout_secs = config.timeout_secs,
            "airflow client ready"
        );

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
            http,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Release the handle.  In-flight permit waiters and all later calls fail
    /// with [`AdapterError::ClientClosed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.permits.close();
            info!(base_url = %self.config.base_url, "airflow client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Issue `method path` with retry, returning the decoded JSON object.
    ///
    /// # Errors
    ///
    /// After the attempt budget is spent, returns a single
    /// [`AdapterError::RetriesExhausted`] describing the last failure.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(AdapterError::ClientClosed);
        }

        let max_attempts = self.config.max_attempts;
        let mut last_failure = String::new();

        for attempt in 0..max_attempts {
            match self.attempt(&method, path, params, body).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(method = %method, path, attempt, "call recovered after retry");
                    }
                    return Ok(value);
                }
                Err(AdapterError::ClientClosed) => return Err(AdapterError::ClientClosed),
                Err(e) => {
                    last_failure = e.to_string();
                    if attempt + 1 < max_attempts {
                        let delay = self.config.backoff(attempt);
                        warn!(
                            method = %method,
                            path,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "airflow call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        error!(method = %method, path, attempts = max_attempts, error = %last_failure, "airflow call failed");
        Err(AdapterError::RetriesExhausted {
            attempts: max_attempts,
            last: last_failure,
        })
    }

    /// Issue a single attempt with no retry.  Used for health checks.
    pub async fn call_once(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(AdapterError::ClientClosed);
        }
        self.attempt(&method, path, params, None).await
    }

    /// Walk `GET path` page by page (`limit`/`offset`) and collect `items_key`
    /// from every page, in request order.
    ///
    /// A page shorter than the page size ends the walk, even an empty one.
    /// Pages are fetched strictly one after another with a short pause in
    /// between.  No deduplication is done: the result is only gap-free if
    /// the upstream collection is stable for the duration of the walk.
    pub async fn fetch_all<T: DeserializeOwned>(&self, path: &str, items_key: &str) -> Result<Vec<T>> {
        let page_size = self.config.page_size;
        let mut items = Vec::new();
        let mut offset = 0usize;

        loop {
            let params = [("limit", page_size.to_string()), ("offset", offset.to_string())];
            let mut page = self.call(Method::GET, path, &params, None).await?;

            let batch: Vec<T> = match page.get_mut(items_key).map(Value::take) {
                None | Some(Value::Null) => Vec::new(),
                Some(raw) => serde_json::from_value(raw)?,
            };
            let received = batch.len();
            items.extend(batch);

            debug!(path, offset, received, total = items.len(), "fetched page");

            if received < page_size {
                break;
            }
            offset += page_size;
            tokio::time::sleep(self.config.page_delay()).await;
        }

        Ok(items)
    }

    // -----------------------------------------------------------------------
    // Single attempt
    // -----------------------------------------------------------------------

    async fn attempt(
        &self,
        method: &Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AdapterError::ClientClosed)?;

        let url = format!("{}{}", self.config.base_url, path);
        debug!(method = %method, url = %url, "sending airflow request");

        let mut request = self
            .http
            .request(method.clone(), &url)
            .basic_auth(&self.config.username, Some(&self.config.password));
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| AdapterError::Transport {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| AdapterError::Transport {
            url: url.clone(),
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(AdapterError::Status {
                url,
                status: status.as_u16(),
                body: text,
            });
        }

        decode_object(&url, &text)
    }
}

/// Decode a 2xx body.  An empty body or JSON `null` reads as `{}`.
fn decode_object(url: &str, text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(AdapterError::Decode {
            url: url.to_string(),
            reason: format!("expected a JSON object, got {}", kind_of(&other)),
        }),
        Err(e) => Err(AdapterError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
