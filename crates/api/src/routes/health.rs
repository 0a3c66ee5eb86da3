use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the database is reachable.
    pub db_healthy: bool,
}

/// GET /health -- returns service and database health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = datalift_db::health_check(&state.pool).await.is_ok();

    let status = if db_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::ServerConfig;
    use crate::dispatcher::JobDispatcher;

    use super::*;

    fn test_state() -> AppState {
        // A lazy pool never connects until queried, so the endpoint is
        // exercisable without a live database: it reports degraded.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(100))
            .connect_lazy("postgres://localhost:1/unreachable")
            .unwrap();
        AppState {
            pool,
            config: Arc::new(ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                engine_url: "http://localhost:8081".to_string(),
                cors_origins: vec![],
                request_timeout_secs: 30,
                shutdown_timeout_secs: 30,
                topic_reload_secs: 60,
                consumer_retry_backoff_secs: 3,
                consumer_retry_max_attempts: None,
            }),
            dispatcher: Arc::new(JobDispatcher::new()),
        }
    }

    #[tokio::test]
    async fn health_reports_degraded_without_a_database() {
        let app = router().with_state(test_state());

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["db_healthy"], false);
    }
}
