use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::debug;
use uuid::Uuid;

use crate::models::{AppState, CreateJobRequest, CreateJobResponse, JobView};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/{id}", get(get_job))
        .with_state(state)
}

async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> AppResult<Json<CreateJobResponse>> {
    let Json(request) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;

    let created = state.service.submit(request.guideline_text.as_deref()).await?;
    Ok(Json(created))
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<JobView>> {
    // Not a UUID means no such job
    let id = Uuid::parse_str(&id).map_err(|_| {
        debug!(raw_id = %id, "Rejected malformed job id");
        AppError::NotFound(format!("Job {}", id))
    })?;

    let view = state.service.fetch(id).await?;
    Ok(Json(view))
}
