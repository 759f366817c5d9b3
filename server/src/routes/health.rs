//! Health check endpoint

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::state::SharedState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub compute_target: String,
    pub num_classes: usize,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: leaf_classifier::VERSION.to_string(),
        compute_target: state.classifier.target().to_string(),
        num_classes: state.classifier.labels().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{get, read_body, test_app};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_reports_target_and_classes() {
        let (app, _dir) = test_app();
        let response = get(app, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let health: HealthResponse = serde_json::from_slice(&read_body(response).await).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.compute_target, "cpu");
        assert_eq!(health.num_classes, 7);
        assert_eq!(health.version, leaf_classifier::VERSION);
    }
}
