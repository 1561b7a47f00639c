use super::state::AppState;
use crate::client::ClientStatus;
use crate::error::ClientError;
use crate::session::{Session, SessionSummary};
use crate::voices::Voice;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    pub persona: Option<String>,
    pub voice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub status: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteSessionResponse {
    pub session_id: String,
    pub removed: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Client errors rendered as JSON with a matching status code
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        let status = match &err {
            ClientError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ClientError::ActiveSessionDeletion(_) => StatusCode::CONFLICT,
            ClientError::Permission(_) => StatusCode::FORBIDDEN,
            ClientError::Device(_) | ClientError::ClientStopped => StatusCode::SERVICE_UNAVAILABLE,
            ClientError::Transport(_) => StatusCode::BAD_GATEWAY,
            ClientError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            warn!("Request rejected: {}", err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> ApiResult<ClientStatus> {
    Ok(Json(state.client.status().await?))
}

/// POST /capture/start
/// Acquire the microphone and connect with the current persona/voice
pub async fn start_capture(State(state): State<AppState>) -> ApiResult<CaptureResponse> {
    info!("Capture start requested");
    state.client.start_capture().await?;
    let status = state.client.status().await?;
    Ok(Json(CaptureResponse {
        status: status.state.to_string(),
        session_id: status.active_session,
    }))
}

/// POST /capture/stop
pub async fn stop_capture(State(state): State<AppState>) -> ApiResult<CaptureResponse> {
    info!("Capture stop requested");
    state.client.stop_capture().await?;
    let status = state.client.status().await?;
    Ok(Json(CaptureResponse {
        status: status.state.to_string(),
        session_id: status.active_session,
    }))
}

/// PUT /settings
/// Change persona and/or voice; a live connection is closed
pub async fn update_settings(
    State(state): State<AppState>,
    Json(req): Json<SettingsRequest>,
) -> ApiResult<ClientStatus> {
    if let Some(persona) = &req.persona {
        if persona.trim().is_empty() {
            return Err(ApiError::bad_request("persona must not be empty"));
        }
    }
    if let Some(voice) = &req.voice {
        if voice.trim().is_empty() {
            return Err(ApiError::bad_request("voice must not be empty"));
        }
        if !state.voices.is_empty() && !state.voices.contains(voice) {
            return Err(ApiError::bad_request(format!("unknown voice {}", voice)));
        }
    }

    if let Some(persona) = req.persona {
        state.client.set_persona(persona).await?;
    }
    if let Some(voice) = req.voice {
        state.client.set_voice(voice).await?;
    }

    Ok(Json(state.client.status().await?))
}

/// GET /voices
pub async fn list_voices(State(state): State<AppState>) -> Json<Vec<Voice>> {
    Json(state.voices.voices().to_vec())
}

/// GET /sessions
/// History, newest first
pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Vec<SessionSummary>> {
    Ok(Json(state.client.sessions().await?))
}

/// POST /sessions
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let session_id = state.client.new_session().await?;
    info!("Created session {} via API", session_id);
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}

/// GET /sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Session> {
    match state.client.session(session_id.clone()).await? {
        Some(session) => Ok(Json(session)),
        None => Err(ClientError::SessionNotFound(session_id).into()),
    }
}

/// POST /sessions/:session_id/select
pub async fn select_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<ClientStatus> {
    state.client.select_session(session_id).await?;
    Ok(Json(state.client.status().await?))
}

/// DELETE /sessions/:session_id
/// Rejected with 409 for the active session, 404 when nothing was there
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<DeleteSessionResponse> {
    let removed = state.client.delete_session(session_id.clone()).await?;
    if !removed {
        return Err(ClientError::SessionNotFound(session_id).into());
    }
    Ok(Json(DeleteSessionResponse {
        session_id,
        removed,
    }))
}
