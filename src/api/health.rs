use axum::{extract::State, Json};
use serde::Serialize;
use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub api_target: String,
    pub oracle: String,
    pub concurrency_limit: usize,
    pub max_attempts: u32,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let executor = state.executor.config();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        api_target: if state.config.api_target_url.is_some() {
            "http".to_string()
        } else {
            "dry-run".to_string()
        },
        oracle: state.oracle.name().to_string(),
        concurrency_limit: executor.concurrency_limit,
        max_attempts: executor.retry.max_attempts,
    })
}
