use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::FunctionType;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(#[from] BuildError),

    #[error("Mapping plan rejected: {0}")]
    InvalidPlan(String),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("External API error: {0}")]
    ExternalAPI(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Reasons the Call Builder refuses to emit a descriptor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("row is unclassified; no descriptor is built for an unknown method")]
    UnknownMethod,

    #[error("{method}: required parameter `{param}` is missing")]
    MissingParam {
        method: FunctionType,
        param: &'static str,
    },

    #[error("{method}: parameter `{param}` is invalid: {reason}")]
    InvalidParam {
        method: FunctionType,
        param: String,
        reason: String,
    },
}

/// Failure of one downstream invocation attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("permanent: {0}")]
    Permanent(String),
}

impl CallError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            CallError::Transient(msg) | CallError::Permanent(msg) => msg,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Validation(ref e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                e.to_string(),
            ),
            AppError::InvalidPlan(ref msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_MAPPING_PLAN",
                msg.clone(),
            ),
            AppError::Oracle(ref msg) => (
                StatusCode::BAD_GATEWAY,
                "ORACLE_ERROR",
                msg.clone(),
            ),
            AppError::ExternalAPI(ref msg) => (
                StatusCode::BAD_GATEWAY,
                "EXTERNAL_API_ERROR",
                msg.clone(),
            ),
            AppError::Csv(ref e) => (
                StatusCode::BAD_REQUEST,
                "CSV_ERROR",
                e.to_string(),
            ),
            AppError::BadRequest(ref msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                msg.clone(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                self.to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
