//! API Routes
//!
//! - `POST /jobs` - Submit a guideline for processing
//! - `GET /jobs/{id}` - Job status and, once finished, its result
//! - `GET /api/health` - Health checks

pub mod health;
pub mod jobs;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors_layer;
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(jobs::router(state.clone()))
        .merge(health::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
