use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use cloudquote_agent::{ChatResponse, DialogueRuntime};
use cloudquote_core::domain::service::ServiceDefinition;
use cloudquote_core::domain::session::{DialogueSession, SessionId};
use cloudquote_core::errors::{ApplicationError, InterfaceError};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<DialogueRuntime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Omitted or blank starts a fresh session.
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesResponse {
    pub currency: String,
    pub services: Vec<ServiceDefinition>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn router(runtime: Arc<DialogueRuntime>) -> Router {
    Router::new()
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/services", get(list_services))
        .route("/api/v1/sessions/{session_id}", get(get_session).delete(end_session))
        .route("/api/v1/sessions/{session_id}/restart", post(restart_session))
        .with_state(ChatState { runtime })
}

async fn chat(
    State(state): State<ChatState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let correlation_id = correlation_id(&headers);
    let session_id = match body.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => SessionId(id.to_string()),
        _ => {
            let id = SessionId(format!("S-{}", Uuid::new_v4()));
            info!(
                event_name = "http.chat.session_created",
                correlation_id = %correlation_id,
                session_id = %id,
                "new chat session"
            );
            id
        }
    };

    state
        .runtime
        .handle_message_with_correlation(&session_id, &body.message, &correlation_id)
        .await
        .map(Json)
        .map_err(|error| api_error(error, &correlation_id))
}

async fn list_services(State(state): State<ChatState>) -> Json<ServicesResponse> {
    let cpq = state.runtime.cpq();
    Json(ServicesResponse {
        currency: cpq.currency().to_string(),
        services: cpq.catalog().list().to_vec(),
    })
}

async fn get_session(
    State(state): State<ChatState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<DialogueSession>> {
    let correlation_id = correlation_id(&headers);
    match state.runtime.session(&SessionId(session_id.clone())).await {
        Ok(Some(session)) => Ok(Json(session)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ApiError { error: format!("session `{session_id}` not found"), correlation_id }),
        )),
        Err(error) => Err(api_error(error, &correlation_id)),
    }
}

async fn restart_session(
    State(state): State<ChatState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ChatResponse>> {
    let correlation_id = correlation_id(&headers);
    state
        .runtime
        .restart(&SessionId(session_id))
        .await
        .map(Json)
        .map_err(|error| api_error(error, &correlation_id))
}

async fn end_session(
    State(state): State<ChatState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let correlation_id = correlation_id(&headers);
    state
        .runtime
        .end_session(&SessionId(session_id))
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error| api_error(error, &correlation_id))
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn api_error(error: ApplicationError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    let interface = error.into_interface(correlation_id);
    error!(
        event_name = "http.request.failed",
        correlation_id = %correlation_id,
        error = %interface,
        "request failed"
    );

    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}
