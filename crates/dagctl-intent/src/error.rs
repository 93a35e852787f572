//! Intent engine error types.
//!
//! Every failure the dispatcher can meet surfaces as an [`IntentError`], and
//! every [`IntentError`] is folded into a failure envelope at the dispatch
//! boundary.  The `Display` text of each variant is the user-facing message.

/// Actions the free-text endpoint understands, in user-facing wording.
pub const SUPPORTED_ACTIONS: &str =
    "list dags, search, details, pause, unpause, trigger, latest run";

/// Unified error type for the intent engine.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    // -- Interpretation errors -----------------------------------------------
    /// The action needs a DAG id and none could be derived from the text.
    #[error("Could not extract DAG ID from query")]
    MissingEntity,

    /// The text matched none of the known intents.
    #[error("Could not understand query: '{query}'. Supported: {}", SUPPORTED_ACTIONS)]
    Unclassified { query: String },

    /// A matcher pattern failed to compile.
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // -- Tool-call errors ----------------------------------------------------
    /// The named tool does not exist.
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// The tool arguments are missing or malformed.
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the Airflow client.
    #[error(transparent)]
    Upstream(#[from] dagctl_adapters::AdapterError),

    // -- Serialization -------------------------------------------------------
    /// JSON serialization of an action output failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the intent crate.
pub type Result<T> = std::result::Result<T, IntentError>;
