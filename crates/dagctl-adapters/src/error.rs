//! Adapter error types.
//!
//! All upstream interaction surfaces errors through [`AdapterError`].  The
//! per-attempt variants (`Transport`, `Status`, `Decode`) never leave the
//! client on their own once retries are involved: exhausting the attempt
//! budget folds the last of them into [`AdapterError::RetriesExhausted`].

/// Unified error type for the Airflow client.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The request never produced an HTTP response (connect, timeout, reset).
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The upstream answered with a non-2xx status.
    #[error("{status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The response body was not a JSON object.
    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// Every attempt failed; carries the rendering of the last failure.
    #[error("Airflow error: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// The client handle was released and can no longer issue calls.
    #[error("airflow client has been closed")]
    ClientClosed,

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization or deserialization of a typed payload failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
