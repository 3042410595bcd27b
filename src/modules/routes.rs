//! REST endpoints for the module workflow.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::error;
use uuid::Uuid;

use crate::error::{Error, ModuleError};
use crate::modules::service::{ModuleService, RequestDecision};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ModuleService>,
}

/// Build the Axum router for the module workflow API.
pub fn module_routes(service: Arc<ModuleService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/health", get(health))
        .route("/api/modules", get(list_modules))
        .route("/api/modules/{id}/config", post(save_configuration))
        .route("/api/chat-modules", get(list_chat_modules).post(toggle_chat_module))
        .route("/api/module-requests", get(list_module_requests).post(create_module_request))
        .route("/api/module-requests/{id}/approve", post(approve_module_request))
        .route("/api/module-requests/{id}/deny", post(deny_module_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Map a workflow error to the wire shape: `{"message": ...}` plus a status.
///
/// Validation failures are 400, missing entities 404, everything else 500
/// with a generic message (the real error is logged server-side).
fn error_response(err: Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        Error::Module(ModuleError::RequirementMismatch { .. }) => StatusCode::BAD_REQUEST,
        Error::Module(ModuleError::AlreadyResolved { .. }) => StatusCode::BAD_REQUEST,
        Error::Module(ModuleError::ModuleNotFound { .. })
        | Error::Module(ModuleError::RequestNotFound { .. }) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "Request failed");
        "Internal server error".to_string()
    } else {
        err.to_string()
    };

    (status, Json(serde_json::json!({ "message": message })))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-modules"
    }))
}

// ── Module listing ──────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModulesQuery {
    user_id: String,
    chat_id: Option<Uuid>,
}

/// GET /api/modules?userId=...&chatId=...
async fn list_modules(
    State(state): State<AppState>,
    Query(query): Query<ListModulesQuery>,
) -> impl IntoResponse {
    match state
        .service
        .list_modules(&query.user_id, query.chat_id)
        .await
    {
        Ok(modules) => (StatusCode::OK, Json(serde_json::json!(modules))),
        Err(e) => error_response(e),
    }
}

// ── Configuration save ──────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveConfigBody {
    user_id: String,
    /// Requirement id to value.
    values: HashMap<Uuid, String>,
}

/// POST /api/modules/{id}/config
async fn save_configuration(
    State(state): State<AppState>,
    Path(module_id): Path<Uuid>,
    Json(body): Json<SaveConfigBody>,
) -> impl IntoResponse {
    match state
        .service
        .save_configuration(&body.user_id, module_id, &body.values)
        .await
    {
        Ok(written) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "fieldsWritten": written })),
        ),
        Err(e) => error_response(e),
    }
}

// ── Chat enablement ─────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ByChatQuery {
    chat_id: Uuid,
}

/// GET /api/chat-modules?chatId=...
async fn list_chat_modules(
    State(state): State<AppState>,
    Query(query): Query<ByChatQuery>,
) -> impl IntoResponse {
    match state.service.list_chat_modules(query.chat_id).await {
        Ok(entries) => (StatusCode::OK, Json(serde_json::json!(entries))),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleBody {
    chat_id: Uuid,
    module_id: Uuid,
    enabled: bool,
}

/// POST /api/chat-modules with `{chatId, moduleId, enabled}`
async fn toggle_chat_module(
    State(state): State<AppState>,
    Json(body): Json<ToggleBody>,
) -> impl IntoResponse {
    match state
        .service
        .set_chat_module(body.chat_id, body.module_id, body.enabled)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "success": true }))),
        Err(e) => error_response(e),
    }
}

// ── Module requests ─────────────────────────────────────────────────────

/// GET /api/module-requests?chatId=... — the chat's requests, newest first,
/// for the approval surface.
async fn list_module_requests(
    State(state): State<AppState>,
    Query(query): Query<ByChatQuery>,
) -> impl IntoResponse {
    match state.service.list_requests(query.chat_id).await {
        Ok(requests) => (StatusCode::OK, Json(serde_json::json!(requests))),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequestBody {
    chat_id: Uuid,
    module_id: Uuid,
    tool_call_id: String,
    #[serde(default)]
    reason: String,
}

/// POST /api/module-requests — called by the AI tool layer.
async fn create_module_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> impl IntoResponse {
    match state
        .service
        .get_or_create_request(body.chat_id, body.module_id, &body.tool_call_id, &body.reason)
        .await
    {
        Ok(request) => (StatusCode::OK, Json(serde_json::json!(request))),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ResolveBody {
    config_values: Option<serde_json::Value>,
}

/// POST /api/module-requests/{id}/approve
///
/// The body is optional; when present it may carry config values to record
/// on the request.
async fn approve_module_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<ResolveBody>, JsonRejection>,
) -> impl IntoResponse {
    let config_values = body.ok().and_then(|Json(b)| b.config_values);
    match state
        .service
        .resolve_request(id, RequestDecision::Approve, config_values)
        .await
    {
        Ok(request) => (StatusCode::OK, Json(serde_json::json!(request))),
        Err(e) => error_response(e),
    }
}

/// POST /api/module-requests/{id}/deny
async fn deny_module_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state
        .service
        .resolve_request(id, RequestDecision::Deny, None)
        .await
    {
        Ok(request) => (StatusCode::OK, Json(serde_json::json!(request))),
        Err(e) => error_response(e),
    }
}
