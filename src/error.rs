use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::tts::SynthesisError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Invalid JSON body")]
    InvalidRequest,

    #[error("Text is too short to generate audio")]
    TextTooShort,

    #[error("{0}")]
    SynthesisFailed(#[from] SynthesisError),

    #[error("No audio was generated")]
    EmptyResult,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidRequest | AppError::TextTooShort => StatusCode::BAD_REQUEST,
            AppError::SynthesisFailed(_) | AppError::EmptyResult => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = self.to_string();

        tracing::error!("Request failed: {} - {}", status, message);

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
