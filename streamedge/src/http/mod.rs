// Module: http
// HTTP boundary of the edge: origin heartbeats, stream listing, fragment delivery

pub mod error;
pub mod health;
pub mod streams;

use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use streamedge_core::EdgeCore;
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub edge: Arc<EdgeCore>,
}

impl AppState {
    pub fn new(edge: Arc<EdgeCore>) -> Self {
        Self { edge }
    }
}

/// `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::create_health_router())
        .merge(streams::create_stream_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
