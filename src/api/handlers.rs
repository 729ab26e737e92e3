use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use std::sync::Arc;

use super::{HealthResponse, TtsRequest};
use crate::api::routes::AppState;
use crate::error::AppError;
use crate::tts::{self, TtsChunk};

/// Minimum text length accepted for synthesis. Shorter inputs make the
/// engine produce unreliable or empty output.
const MIN_TEXT_CHARS: usize = 10;

pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    // The body is parsed as JSON regardless of the declared Content-Type.
    let request: TtsRequest =
        serde_json::from_slice(&body).map_err(|_| AppError::InvalidRequest)?;

    if request.text.chars().count() < MIN_TEXT_CHARS {
        return Err(AppError::TextTooShort);
    }

    // Unknown or malformed voices fall back to the default, never reject.
    let voice = tts::resolve_voice(&request.voice_id);

    // One stream per request, drained to completion before responding.
    let mut stream = state.engine.synthesize(&request.text, voice).await?;

    let mut audio: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            TtsChunk::Audio(data) => audio.extend_from_slice(&data),
            TtsChunk::Metadata(_) => {}
        }
    }

    if audio.is_empty() {
        return Err(AppError::EmptyResult);
    }

    tracing::debug!(voice, bytes = audio.len(), "synthesis complete");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/mpeg".to_string()),
            (header::CONTENT_LENGTH, audio.len().to_string()),
        ],
        audio,
    )
        .into_response())
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
