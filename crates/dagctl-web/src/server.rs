//! Main web server setup and startup.
//!
//! [`WebServer`] composes the Axum router, registers all routes, and runs the
//! HTTP listener until Ctrl-C.  The upstream client is closed once the
//! listener has drained.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use dagctl_adapters::{AirflowApi, AirflowClient};
use dagctl_intent::Dispatcher;

use crate::WebConfig;
use crate::api;
use crate::mcp;
use crate::state::AppState;

/// The dagctl web server.
pub struct WebServer {
    config: WebConfig,
    client: Arc<AirflowClient>,
    state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server.
    ///
    /// # Arguments
    ///
    /// * `config` - Bind address and port configuration.
    /// * `client` - The upstream client; closed when the server stops.
    ///
    /// # Errors
    ///
    /// Returns an error if the interpreter patterns fail to compile.
    pub fn new(config: WebConfig, client: Arc<AirflowClient>) -> dagctl_intent::Result<Self> {
        let api: Arc<dyn AirflowApi> = client.clone();
        let dispatcher = Arc::new(Dispatcher::new(api)?);
        let state = Arc::new(AppState::new(dispatcher, config.clone()));
        Ok(Self {
            config,
            client,
            state,
        })
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        self.config.addr()
    }

    /// Build the Axum router with all routes registered.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);

        Router::new()
            .route("/", get(api::root))
            .route("/run", post(api::run))
            .route("/api/status", get(api::status))
            // MCP (Model Context Protocol) endpoint.
            .route("/mcp", post(mcp::handle_mcp_request))
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Start the server and block until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.addr();
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(addr = %addr, upstream = %self.client.base_url(), "starting web server");
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves, then
    /// close the upstream client.
    pub async fn serve<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        self.client.close();
        tracing::info!("web server stopped, upstream client closed");
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
