use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::constants::MAX_ROWS_PER_REQUEST;
use crate::error::{AppError, Result};
use crate::models::{ApiResponse, Row};
use crate::services::batch_executor::CancelToken;
use crate::services::pipeline::{choose_strategy, collect_headers, PreparedBatch, RunReport};

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub instruction: Option<String>,
    pub rows: Vec<Row>,
    /// When false only the prepared descriptors are returned.
    #[serde(default)]
    pub dispatch: bool,
}

#[derive(Debug, Serialize)]
pub struct PreparedResponse {
    pub warnings: Vec<String>,
    #[serde(flatten)]
    pub batch: PreparedBatch,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProcessResponse {
    Prepared(PreparedResponse),
    Report(RunReport),
}

/// POST /api/v1/process
pub async fn process_rows(
    State(state): State<AppState>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ApiResponse<ProcessResponse>>> {
    if req.rows.is_empty() {
        return Err(AppError::BadRequest("rows must not be empty".to_string()));
    }
    if req.rows.len() > MAX_ROWS_PER_REQUEST {
        return Err(AppError::BadRequest(format!(
            "at most {} rows per request",
            MAX_ROWS_PER_REQUEST
        )));
    }

    let headers = collect_headers(&req.rows);
    let choice = choose_strategy(
        Some(state.oracle.as_ref()),
        req.instruction.as_deref(),
        &headers,
    )
    .await;

    let response = if req.dispatch {
        let report = state
            .pipeline
            .run(&req.rows, choice, &state.executor, CancelToken::new())
            .await;
        ProcessResponse::Report(report)
    } else {
        let batch = state.pipeline.prepare(&req.rows, choice.strategy.as_ref());
        ProcessResponse::Prepared(PreparedResponse {
            warnings: choice.warnings,
            batch,
        })
    };

    Ok(Json(ApiResponse::success(response)))
}
