//! Shared application state for the web server.
//!
//! [`AppState`] is wrapped in an `Arc` and shared across all request
//! handlers.  It holds the dispatcher and the upstream client it drives.

use std::sync::Arc;

use dagctl_adapters::AirflowApi;
use dagctl_intent::Dispatcher;

use crate::WebConfig;

/// Shared state accessible from every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Executes queries and tool calls.
    pub dispatcher: Arc<Dispatcher>,

    /// Upstream API, used directly only by the health check.
    pub api: Arc<dyn AirflowApi>,

    /// Web server configuration.
    pub config: WebConfig,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, config: WebConfig) -> Self {
        Self {
            api: Arc::clone(dispatcher.api()),
            dispatcher,
            config,
        }
    }
}
