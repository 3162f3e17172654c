//! HTTP-facing error wrapper: maps [`olympus_common::error::AppError`] onto
//! a status code and a structured JSON body, sanitizing internal details.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use olympus_common::error::AppError;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match &self.0 {
            AppError::InfrastructureFailure { .. } | AppError::Internal(_) => {
                tracing::error!(error = %self.0, "internal error");
                "an internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ApiErrorResponse {
            error: ApiErrorBody {
                code: self.0.error_code(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
