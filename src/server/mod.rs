//! HTTP surface for the aggregator.
//!
//! `GET /quotes` runs one aggregation with the caller's `X-API-Key` header and returns the
//! [`AggregateResult`](crate::quote::AggregateResult) as JSON. `GET /health` answers without
//! touching any provider.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{error, info, warn};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Context, Result};
use crate::services::Aggregator;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    /// Cancelled on shutdown; every in-flight run watches a child of it.
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/quotes", get(get_quotes).fallback(method_not_allowed))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn get_quotes(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let credential = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    let cancel = state.shutdown.child_token();
    match state.aggregator.run(credential, &cancel).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &AppError) -> Response {
    if err.is_config() {
        warn!("Rejected quotes request: {err}");
        let message = match err {
            AppError::Config(message) => message.as_str(),
            _ => "Bad request",
        };
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response();
    }

    error!("Quote aggregation failed: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "success": false,
            "error": "Failed to fetch stock data",
            "message": err.to_string(),
        })),
    )
        .into_response()
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
