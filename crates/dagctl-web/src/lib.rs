//! Web front end for dagctl.
//!
//! This crate exposes the dispatcher over HTTP.  It includes:
//!
//! - `POST /run` for free-text queries, answered with the response envelope.
//! - `GET /` and `GET /api/status` for liveness and upstream health.
//! - An MCP (Model Context Protocol) endpoint at `POST /mcp` that exposes
//!   the tool catalog to LLM clients.

pub mod api;
pub mod mcp;
pub mod server;
pub mod state;

use serde::Deserialize;

pub use mcp::McpServer;
pub use server::WebServer;
pub use state::AppState;

/// Web server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
}

impl WebConfig {
    /// Return the `host:port` string to bind.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8800,
        }
    }
}
