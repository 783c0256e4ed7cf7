use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Olympiad tutor grading stub".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec![
            "POST /api/submit_solution",
            "POST /api/grade_submission/{submission_id}",
            "GET /api/submission/{submission_id}/results",
        ],
    })
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.store().stats().await;
    let mut components = HashMap::new();
    components.insert("store".to_string(), "in-memory".to_string());
    components.insert("submissions".to_string(), stats.submissions.to_string());
    components.insert("problem_submissions".to_string(), stats.problem_submissions.to_string());
    components.insert("results".to_string(), stats.results.to_string());
    components.insert("answer_key".to_string(), state.answer_key().len().to_string());

    Json(HealthResponse {
        service: "grading-stub".to_string(),
        status: "healthy".to_string(),
        components,
    })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
