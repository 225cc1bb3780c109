//! HTTP endpoint handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use tracing::{error, info, warn};

use super::{
    responses::{
        ConfigResponse, ErrorResponse, HealthResponse, IdentityRequest, StatusResponse,
        TimerResponse, VisibilityRequest, VisibilityResponse,
    },
    ApiState,
};
use crate::{
    state::{StoredConfig, TimerError},
    store::Identity,
    timing::Visibility,
};

/// Handler failure mapped onto an HTTP status
#[derive(Debug)]
pub enum ApiError {
    NotReady,
    BadRequest(String),
    Internal(String),
}

impl From<TimerError> for ApiError {
    fn from(error: TimerError) -> Self {
        match error {
            TimerError::NotReady => Self::NotReady,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::NotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("not_ready", "Timer is still loading"),
            ),
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new("bad_request", message))
            }
            Self::Internal(message) => {
                error!("Request failed: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("error", message),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Handle POST /timer/start
pub async fn start_handler(State(api): State<ApiState>) -> Result<Json<TimerResponse>, ApiError> {
    let view = api.timer.start()?;
    Ok(Json(TimerResponse::new("Timer started", view)))
}

/// Handle POST /timer/pause
pub async fn pause_handler(State(api): State<ApiState>) -> Result<Json<TimerResponse>, ApiError> {
    let view = api.timer.pause()?;
    Ok(Json(TimerResponse::new("Timer paused", view)))
}

/// Handle POST /timer/reset
pub async fn reset_handler(State(api): State<ApiState>) -> Result<Json<TimerResponse>, ApiError> {
    let view = api.timer.reset()?;
    Ok(Json(TimerResponse::new("Timer reset", view)))
}

/// Handle POST /timer/skip
pub async fn skip_handler(State(api): State<ApiState>) -> Result<Json<TimerResponse>, ApiError> {
    let view = api.timer.skip()?;
    let message = format!("Skipped to {}", view.phase_label);
    Ok(Json(TimerResponse::new(message, view)))
}

/// Handle GET /timer
pub async fn timer_handler(State(api): State<ApiState>) -> Result<Json<TimerResponse>, ApiError> {
    let view = api.timer.view()?;
    Ok(Json(TimerResponse::new(view.status_line.clone(), view)))
}

/// Handle GET /config
pub async fn get_config_handler(State(api): State<ApiState>) -> Result<Json<ConfigResponse>, ApiError> {
    Ok(Json(ConfigResponse {
        config: api.timer.config()?,
        timestamp: Utc::now(),
    }))
}

/// Handle PUT /config - fields may be numbers or numeric strings
pub async fn put_config_handler(
    State(api): State<ApiState>,
    Json(raw): Json<StoredConfig>,
) -> Result<Json<ConfigResponse>, ApiError> {
    let rejected = raw.rejected_fields();
    if !rejected.is_empty() && rejected.len() == present_fields(&raw) {
        return Err(ApiError::BadRequest(format!(
            "No valid configuration values; rejected {}",
            rejected.join(", ")
        )));
    }

    api.timer.update_config(&raw)?;
    Ok(Json(ConfigResponse {
        config: api.timer.config()?,
        timestamp: Utc::now(),
    }))
}

/// Handle POST /visibility
pub async fn visibility_handler(
    State(api): State<ApiState>,
    Json(request): Json<VisibilityRequest>,
) -> Json<VisibilityResponse> {
    let visibility = Visibility::from_visible(request.visible);
    api.timer.set_visibility(visibility);
    Json(VisibilityResponse {
        visibility,
        timestamp: Utc::now(),
    })
}

/// Handle POST /identity - switch whose records are active
pub async fn identity_handler(
    State(api): State<ApiState>,
    Json(request): Json<IdentityRequest>,
) -> Result<Json<TimerResponse>, ApiError> {
    let identity = Identity::from_parts(request.uid, request.token);
    let store = api.stores.for_identity(&identity).map_err(|e| {
        warn!("Cannot switch to {:?}: {}", identity.uid(), e);
        ApiError::BadRequest(e.to_string())
    })?;

    let recovery = api.timer.switch_identity(identity.clone(), store).await?;
    info!("Identity switched to {:?} ({:?})", identity.uid(), recovery);

    let view = api.timer.view()?;
    let message = match identity.uid() {
        Some(uid) => format!("Signed in as {uid}"),
        None => "Signed out".to_string(),
    };
    Ok(Json(TimerResponse::new(message, view)))
}

/// Handle GET /status - Return current daemon status
pub async fn status_handler(State(api): State<ApiState>) -> Json<StatusResponse> {
    let (last_action, last_action_time) = api.timer.get_last_action();
    Json(StatusResponse {
        ready: api.timer.is_ready(),
        identity: api.timer.identity().ok(),
        visibility: api.timer.visibility(),
        uptime: api.timer.get_uptime(),
        port: api.timer.port,
        host: api.timer.host.clone(),
        last_action,
        last_action_time,
    })
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

fn present_fields(raw: &StoredConfig) -> usize {
    [
        raw.focus_minutes.is_some(),
        raw.break_minutes.is_some(),
        raw.long_break_minutes.is_some(),
        raw.intervals_before_long_break.is_some(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count()
}
