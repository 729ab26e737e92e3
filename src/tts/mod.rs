pub mod edge;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use lazy_static::lazy_static;
use regex::Regex;

pub use edge::EdgeTtsEngine;

/// Voice used whenever the client omits the voice or sends a malformed one.
pub const DEFAULT_VOICE: &str = "en-US-AriaNeural";

lazy_static! {
    // Locale-qualified neural voice names, e.g. "en-US-AriaNeural".
    // Shape check only: Microsoft adds new voices regularly, so an
    // exhaustive allowlist would go stale.
    static ref VOICE_RE: Regex =
        Regex::new(r"^[a-z]{2,3}-[A-Z]{2}(-[A-Za-z]+)*Neural$").unwrap();
}

/// Pick the effective voice for a request.
///
/// Malformed or empty identifiers fall back to [`DEFAULT_VOICE`] instead of
/// failing the request.
pub fn resolve_voice(voice_id: &str) -> &str {
    if VOICE_RE.is_match(voice_id) {
        voice_id
    } else {
        DEFAULT_VOICE
    }
}

/// One unit of streamed synthesis output.
#[derive(Debug, Clone)]
pub enum TtsChunk {
    /// Compressed audio bytes. Meaningful only in emission order.
    Audio(Bytes),
    /// Timing metadata (word/sentence boundary events). Never part of the
    /// audio response.
    Metadata(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("{0}")]
    Protocol(String),

    #[error("connection closed before synthesis finished")]
    ConnectionClosed,
}

pub type ChunkStream = BoxStream<'static, Result<TtsChunk, SynthesisError>>;

/// A text-to-speech backend producing a finite stream of tagged chunks.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Open one synthesis stream for `(text, voice)`.
    ///
    /// The stream terminates naturally when synthesis completes and cannot
    /// be restarted. Callers must drain it to completion.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<ChunkStream, SynthesisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_voice_passes_through() {
        assert_eq!(resolve_voice("en-US-AriaNeural"), "en-US-AriaNeural");
        assert_eq!(resolve_voice("fr-FR-DeniseNeural"), "fr-FR-DeniseNeural");
        assert_eq!(resolve_voice("fil-PH-BlessicaNeural"), "fil-PH-BlessicaNeural");
        assert_eq!(resolve_voice("zh-CN-XiaoxiaoNeural"), "zh-CN-XiaoxiaoNeural");
    }

    #[test]
    fn test_multi_segment_name() {
        assert_eq!(
            resolve_voice("en-GB-Ryan-TestNeural"),
            "en-GB-Ryan-TestNeural"
        );
    }

    #[test]
    fn test_empty_voice_falls_back() {
        assert_eq!(resolve_voice(""), DEFAULT_VOICE);
    }

    #[test]
    fn test_malformed_voice_falls_back() {
        assert_eq!(resolve_voice("aria"), DEFAULT_VOICE);
        assert_eq!(resolve_voice("EN-us-AriaNeural"), DEFAULT_VOICE);
        assert_eq!(resolve_voice("en-US-Aria"), DEFAULT_VOICE);
        assert_eq!(resolve_voice("en-US-AriaNeural extra"), DEFAULT_VOICE);
        assert_eq!(resolve_voice("english-US-AriaNeural"), DEFAULT_VOICE);
    }
}
