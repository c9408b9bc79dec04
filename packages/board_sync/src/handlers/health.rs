use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::metrics;

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let rooms = state.registry.room_sizes().await;
    let metrics = state.metrics.snapshot();

    let status = if state.cancel.is_cancelled() {
        "shutting_down"
    } else {
        "healthy"
    };

    Json(metrics::HealthStatus {
        status: status.to_string(),
        connections: metrics.connections.active,
        rooms: rooms.len(),
        boards: state.store.partition_count().await,
        objects: state.store.object_count().await,
        uptime_secs: metrics.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::test_helpers::{ALICE_TOKEN, BOARD_ID, test_app_state};

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_reports_healthy() {
        let (state, _registry_task) = test_app_state();
        let app = crate::build_router(state, "");

        let (status, json) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["connections"], 0);
        assert_eq!(json["rooms"], 0);
        assert_eq!(json["boards"], 0);
        assert_eq!(json["objects"], 0);
    }

    #[tokio::test]
    async fn test_health_counts_live_boards() {
        let (state, _registry_task) = test_app_state();
        crate::auth::admit(&state, BOARD_ID, Some(ALICE_TOKEN))
            .await
            .unwrap();
        let app = crate::build_router(state, "");

        let (_, json) = get_json(app, "/health").await;
        assert_eq!(json["boards"], 1);
        assert_eq!(json["objects"], 1);
    }

    #[tokio::test]
    async fn test_health_after_shutdown() {
        let (state, _registry_task) = test_app_state();
        state.cancel.cancel();
        let app = crate::build_router(state, "");

        let (_, json) = get_json(app, "/health").await;
        assert_eq!(json["status"], "shutting_down");
    }

    #[tokio::test]
    async fn test_routes_respect_base_path() {
        let (state, _registry_task) = test_app_state();
        let app = crate::build_router(state, "/sync");

        let (status, json) = get_json(app.clone(), "/sync/health/live").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "alive");

        let (status, _) = get_json(app.clone(), "/health/live").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = get_json(app, "/sync/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["connections"]["active"], 0);
    }
}
