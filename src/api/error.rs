use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::models::ErrorResponse;
use crate::config::ParamError;

/// Every failure on `/generate` is reported as `{"error": ...}` with a 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    InvalidJson(#[from] JsonRejection),
    #[error(transparent)]
    InvalidParameter(#[from] ParamError),
    #[error(transparent)]
    Generation(#[from] candle_core::Error),
    #[error("generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.to_string();
        tracing::error!("Request failed: {}", error);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error })).into_response()
    }
}
