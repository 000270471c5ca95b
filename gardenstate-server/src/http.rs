//! GardenState HTTP REST API
//!
//! Axum-based HTTP server that accepts new user messages and trigger events.
//! Runs alongside the Unix socket IPC server on port 8787 (configurable).
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`, so the logic is testable
//! without axum dispatch.
//!
//! Endpoints:
//! - GET  /health  store health
//! - GET  /version  server version info
//! - POST /events  enqueue a trigger event
//! - POST /subjects/:sid/entries/:eid/messages  append a user message
//! - GET  /subjects/:sid/entries/:eid  read back an entry

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use gardenstate_core::ipc::{GardenRequest, GardenResponse};
use gardenstate_core::models::{NewMessage, TriggerEvent};
use gardenstate_core::{GardenConfig, StoreError};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::router::{self, RouterState};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub router: RouterState,
    pub config: GardenConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/events", post(events_handler))
        .route(
            "/subjects/:subject_id/entries/:entry_id/messages",
            post(post_message_handler),
        )
        .route("/subjects/:subject_id/entries/:entry_id", get(get_entry_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    router: RouterState,
    config: GardenConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState { router, config });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("GardenState HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub uid: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

fn error_body(msg: impl std::fmt::Display) -> serde_json::Value {
    serde_json::json!({
        "error": msg.to_string(),
        "status": "error",
    })
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

pub async fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    let response = router::handle_request(GardenRequest::Health, &state.router).await;
    match response_to_http(response) {
        Ok(mut data) => {
            if let Some(obj) = data.as_object_mut() {
                obj.insert(
                    "version".to_string(),
                    serde_json::json!(env!("CARGO_PKG_VERSION")),
                );
                obj.insert(
                    "socket".to_string(),
                    serde_json::json!(state.config.service.socket_path),
                );
            }
            (StatusCode::OK, data)
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e,
            }),
        ),
    }
}

/// Pure, no IO.
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "gardenstate/1",
    })
}

/// Enqueue an externally produced trigger event.
pub async fn events_inner(state: &HttpState, event: TriggerEvent) -> (StatusCode, serde_json::Value) {
    let response = router::handle_request(GardenRequest::Trigger { event }, &state.router).await;
    match response_to_http(response) {
        Ok(data) => (StatusCode::ACCEPTED, data),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, error_body(e)),
    }
}

/// Append a user message, then hand it to the pipeline unless the store
/// announces new messages itself.
pub async fn post_message_inner(
    state: &HttpState,
    subject_id: &str,
    entry_id: &str,
    req: PostMessageRequest,
) -> (StatusCode, serde_json::Value) {
    if req.content.trim().is_empty() && req.images.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_body("content or images are required"),
        );
    }
    if req.uid.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, error_body("uid is required"));
    }

    let store = state.router.store();
    let new_message = NewMessage::user(req.uid, &req.content, req.images);
    let message_id = match store
        .append_message(subject_id, entry_id, new_message.clone())
        .await
    {
        Ok(id) => id,
        Err(e @ StoreError::NotFound { .. }) => return (StatusCode::NOT_FOUND, error_body(e)),
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    };

    if store.emits_change_events() {
        return (
            StatusCode::CREATED,
            serde_json::json!({ "id": message_id, "queued": false }),
        );
    }

    let event = TriggerEvent {
        subject_id: subject_id.to_string(),
        entry_id: entry_id.to_string(),
        message_id: message_id.clone(),
        message: new_message.into_message(message_id.clone()),
    };
    match state.router.queue.enqueue(event) {
        Ok(()) => (
            StatusCode::CREATED,
            serde_json::json!({ "id": message_id, "queued": true }),
        ),
        Err(e) => {
            tracing::error!(message_id = %message_id, error = %e, "Message saved but not queued");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "id": message_id,
                    "queued": false,
                    "error": e.to_string(),
                    "status": "error",
                }),
            )
        }
    }
}

pub async fn get_entry_inner(
    state: &HttpState,
    subject_id: &str,
    entry_id: &str,
) -> (StatusCode, serde_json::Value) {
    match state.router.store().get_entry(subject_id, entry_id).await {
        Ok(Some(entry)) => match serde_json::to_value(&entry) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
        },
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_body(StoreError::entry_not_found(subject_id, entry_id)),
        ),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    }
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn events_handler(
    State(state): State<Arc<HttpState>>,
    Json(event): Json<TriggerEvent>,
) -> impl IntoResponse {
    let (status, body) = events_inner(&state, event).await;
    (status, Json(body))
}

pub async fn post_message_handler(
    State(state): State<Arc<HttpState>>,
    Path((subject_id, entry_id)): Path<(String, String)>,
    Json(req): Json<PostMessageRequest>,
) -> impl IntoResponse {
    let (status, body) = post_message_inner(&state, &subject_id, &entry_id, req).await;
    (status, Json(body))
}

pub async fn get_entry_handler(
    State(state): State<Arc<HttpState>>,
    Path((subject_id, entry_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let (status, body) = get_entry_inner(&state, &subject_id, &entry_id).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert an IPC `GardenResponse` into an HTTP body value, or an error string.
pub fn response_to_http(response: GardenResponse) -> std::result::Result<serde_json::Value, String> {
    if response.status == "ok" {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}
