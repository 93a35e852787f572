//! REST API route handlers.
//!
//! Provides the free-text query endpoint, a liveness payload, and an
//! upstream health check.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dagctl_intent::{ActionResult, SUPPORTED_ACTIONS};

use crate::state::AppState;

const SERVER_NAME: &str = "dagctl";

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

/// Response payload for the `/` liveness endpoint.
#[derive(Serialize)]
pub struct RootResponse {
    pub server: &'static str,
    pub status: &'static str,
    pub version: &'static str,
    pub supported: &'static str,
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        server: SERVER_NAME,
        status: "ready",
        version: env!("CARGO_PKG_VERSION"),
        supported: SUPPORTED_ACTIONS,
    })
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Response payload for the `/api/status` endpoint.
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// The upstream health document, or the error that prevented reading it.
    pub upstream: Value,
}

/// Check the upstream `/health` endpoint once, without retries.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (status, upstream) = match state.api.health().await {
        Ok(health) => ("healthy", health),
        Err(e) => {
            tracing::warn!(error = %e, "upstream health check failed");
            ("degraded", Value::String(e.to_string()))
        }
    };

    Json(StatusResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        upstream,
    })
}

// ---------------------------------------------------------------------------
// POST /run
// ---------------------------------------------------------------------------

/// Request body for the free-text endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RunBody {
    /// The query text.  Missing reads as empty, which classifies as unknown.
    #[serde(default)]
    pub query: String,
}

/// Interpret and execute one free-text query.
///
/// Always answers with a response envelope.  A body that is not a JSON
/// object is rejected with `400` and a failure envelope.
pub async fn run(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RunBody>, JsonRejection>,
) -> (StatusCode, Json<ActionResult>) {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "rejected /run body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ActionResult::failure(format!(
                    "invalid request body: {}",
                    rejection.body_text()
                ))),
            );
        }
    };

    tracing::info!(query = %body.query, "run request");
    let result = state.dispatcher.run_query(&body.query).await;
    (StatusCode::OK, Json(result))
}
