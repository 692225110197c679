use axum::{extract::State, routing::get, Json, Router};
use tracing::warn;

use crate::models::{AppState, HealthResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, database) = match state.store.health_check().await {
        Ok(()) => ("ok", "connected".to_string()),
        Err(e) => {
            warn!(backend = state.store.backend(), error = %e, "Store health check failed");
            ("degraded", "unavailable".to_string())
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database: format!("{} ({})", database, state.store.backend()),
        queue: state.service.queue_name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::MemoryJobStore;
    use crate::queue::ChannelQueue;
    use crate::service::JobService;
    use crate::AppState;

    #[tokio::test]
    async fn test_health_reports_backends() {
        let store = Arc::new(MemoryJobStore::new());
        let (queue, _receiver) = ChannelQueue::new(4);
        let state = AppState {
            service: Arc::new(JobService::new(store.clone(), Arc::new(queue))),
            store,
            config: Config::for_tests(),
        };

        let response = crate::create_router(state)
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "connected (memory)");
        assert_eq!(body["queue"], "channel");
        assert!(body["timestamp"].is_string());
    }
}
