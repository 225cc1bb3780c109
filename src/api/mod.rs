//! HTTP API module
//!
//! This module contains all HTTP endpoint handlers and response structures.

pub mod handlers;
pub mod responses;

use std::sync::Arc;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{state::AppState, store::StoreSelector};
use handlers::*;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub timer: Arc<AppState>,
    pub stores: StoreSelector,
}

/// Create the HTTP router with all endpoints
pub fn create_router(timer: Arc<AppState>, stores: StoreSelector) -> Router {
    Router::new()
        .route("/timer", get(timer_handler))
        .route("/timer/start", post(start_handler))
        .route("/timer/pause", post(pause_handler))
        .route("/timer/reset", post(reset_handler))
        .route("/timer/skip", post(skip_handler))
        .route("/config", get(get_config_handler).put(put_config_handler))
        .route("/visibility", post(visibility_handler))
        .route("/identity", post(identity_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { timer, stores })
}
