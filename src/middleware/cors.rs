// CORS configuration built from ALLOWED_ORIGINS

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// `*` anywhere in the list allows every origin. Entries that are not valid
/// header values are skipped.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    async fn allow_origin_for(allowed: &[&str], origin: &str) -> Option<String> {
        let allowed: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(&allowed));

        let response = app
            .oneshot(Request::builder().uri("/").header("origin", origin).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_wildcard_allows_any_origin() {
        assert_eq!(allow_origin_for(&["*"], "http://a.example").await.as_deref(), Some("*"));
    }

    #[tokio::test]
    async fn test_explicit_origins() {
        let allowed = ["http://localhost:3000", "https://app.example"];
        assert_eq!(
            allow_origin_for(&allowed, "https://app.example").await.as_deref(),
            Some("https://app.example")
        );
        assert_eq!(allow_origin_for(&allowed, "https://evil.example").await, None);
    }
}
