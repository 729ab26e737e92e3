//! WebSocket client for Microsoft's Edge read-aloud synthesis service.
//!
//! The service speaks a framed protocol over a single WebSocket: the client
//! sends a `speech.config` message selecting the output format, then an
//! `ssml` message carrying the text, and reads frames until `turn.end`.
//! Audio arrives in binary frames; boundary metadata in text frames.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures_util::{stream, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use super::{ChunkStream, SynthesisEngine, SynthesisError, TtsChunk};

const ENDPOINT: &str =
    "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1";

// Public token used by the Edge browser's read-aloud feature.
const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";

// The endpoint only accepts connections that look like the Edge read-aloud
// extension, hence the Origin and User-Agent below.
const ORIGIN: &str = "chrome-extension://jdiccldimpdaibmpdkjnbmckianbfold";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36 Edg/122.0.0.0";

/// MP3 output matching the `audio/mpeg` wire contract.
const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct EdgeTtsEngine {
    endpoint: String,
}

impl EdgeTtsEngine {
    pub fn new() -> Self {
        Self {
            endpoint: ENDPOINT.to_string(),
        }
    }
}

impl Default for EdgeTtsEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisEngine for EdgeTtsEngine {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<ChunkStream, SynthesisError> {
        let connect_id = Uuid::new_v4().simple().to_string();
        let url = format!(
            "{}?TrustedClientToken={}&ConnectionId={}",
            self.endpoint, TRUSTED_CLIENT_TOKEN, connect_id
        );

        let mut request = url.into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("Pragma", HeaderValue::from_static("no-cache"));
        headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
        headers.insert("Origin", HeaderValue::from_static(ORIGIN));
        headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));

        let (mut ws, _) = connect_async(request).await?;

        ws.send(Message::Text(speech_config_message())).await?;
        ws.send(Message::Text(ssml_message(&connect_id, text, voice)))
            .await?;

        tracing::debug!(voice, chars = text.chars().count(), "synthesis stream opened");

        Ok(Box::pin(stream::unfold(
            ReadState { ws, done: false },
            read_next,
        )))
    }
}

struct ReadState {
    ws: WsStream,
    done: bool,
}

async fn read_next(mut state: ReadState) -> Option<(Result<TtsChunk, SynthesisError>, ReadState)> {
    if state.done {
        return None;
    }

    loop {
        match state.ws.next().await {
            // The server must announce turn.end before going away.
            None | Some(Ok(Message::Close(_))) => {
                state.done = true;
                return Some((Err(SynthesisError::ConnectionClosed), state));
            }
            Some(Err(e)) => {
                state.done = true;
                return Some((Err(e.into()), state));
            }
            Some(Ok(Message::Binary(frame))) => match audio_payload(&frame) {
                Ok(Some(data)) => return Some((Ok(TtsChunk::Audio(data)), state)),
                Ok(None) => {}
                Err(e) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
            },
            Some(Ok(Message::Text(msg))) => match message_path(&msg) {
                Some("turn.end") => {
                    let _ = state.ws.close(None).await;
                    return None;
                }
                Some("audio.metadata") => {
                    let body = message_body(&msg).unwrap_or_default().to_string();
                    return Some((Ok(TtsChunk::Metadata(body)), state));
                }
                // turn.start, response: protocol bookkeeping
                _ => {}
            },
            // ping/pong
            Some(Ok(_)) => {}
        }
    }
}

fn timestamp() -> String {
    Utc::now()
        .format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
        .to_string()
}

fn speech_config_message() -> String {
    let config = serde_json::json!({
        "context": {
            "synthesis": {
                "audio": {
                    "metadataoptions": {
                        "sentenceBoundaryEnabled": "false",
                        "wordBoundaryEnabled": "true"
                    },
                    "outputFormat": OUTPUT_FORMAT
                }
            }
        }
    });

    format!(
        "X-Timestamp:{}\r\nContent-Type:application/json; charset=utf-8\r\nPath:speech.config\r\n\r\n{}",
        timestamp(),
        config
    )
}

fn ssml_message(request_id: &str, text: &str, voice: &str) -> String {
    let ssml = format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='en-US'>\
         <voice name='{}'><prosody pitch='+0Hz' rate='+0%' volume='+0%'>{}</prosody></voice></speak>",
        voice,
        escape_xml(text)
    );

    format!(
        "X-RequestId:{}\r\nContent-Type:application/ssml+xml\r\nX-Timestamp:{}\r\nPath:ssml\r\n\r\n{}",
        request_id,
        timestamp(),
        ssml
    )
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `Path:` header of a text frame. Headers are separated from the body by a
/// blank line, one `Name:Value` pair per line.
fn message_path(msg: &str) -> Option<&str> {
    let headers = msg.split("\r\n\r\n").next()?;
    headers
        .lines()
        .find_map(|line| line.strip_prefix("Path:"))
        .map(str::trim)
}

fn message_body(msg: &str) -> Option<&str> {
    msg.split_once("\r\n\r\n").map(|(_, body)| body)
}

/// Extract the audio payload from a binary frame, if it carries one.
///
/// Binary frames start with a big-endian u16 header length, followed by the
/// ASCII header block and the payload. Only frames whose headers contain
/// `Path:audio` carry audio data.
fn audio_payload(frame: &[u8]) -> Result<Option<Bytes>, SynthesisError> {
    if frame.len() < 2 {
        return Err(SynthesisError::Protocol(
            "binary frame shorter than its length prefix".to_string(),
        ));
    }

    let header_len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    let payload = frame.get(2 + header_len..).ok_or_else(|| {
        SynthesisError::Protocol("binary frame header length exceeds frame size".to_string())
    })?;
    let header = std::str::from_utf8(&frame[2..2 + header_len]).map_err(|_| {
        SynthesisError::Protocol("binary frame header is not valid UTF-8".to_string())
    })?;

    if header.lines().any(|line| line.trim() == "Path:audio") {
        Ok(Some(Bytes::copy_from_slice(payload)))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_frame(header: &str, payload: &[u8]) -> Vec<u8> {
        let mut frame = (header.len() as u16).to_be_bytes().to_vec();
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn test_audio_frame_payload() {
        let frame = binary_frame(
            "X-RequestId:abc\r\nContent-Type:audio/mpeg\r\nPath:audio",
            b"\x00\x01\x02",
        );
        let payload = audio_payload(&frame).unwrap();
        assert_eq!(payload.as_deref(), Some(&b"\x00\x01\x02"[..]));
    }

    #[test]
    fn test_non_audio_binary_frame_is_skipped() {
        let frame = binary_frame("Path:something.else", b"ignored");
        assert!(audio_payload(&frame).unwrap().is_none());
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        assert!(audio_payload(&[0x00]).is_err());

        // Header length pointing past the end of the frame
        let frame = [0x00, 0x40, b'P', b'a'];
        assert!(audio_payload(&frame).is_err());
    }

    #[test]
    fn test_message_path() {
        let msg = "X-RequestId:abc\r\nPath:turn.end\r\n\r\n{}";
        assert_eq!(message_path(msg), Some("turn.end"));
        assert_eq!(message_path("no headers here"), None);
    }

    #[test]
    fn test_metadata_body() {
        let msg = "Path:audio.metadata\r\n\r\n{\"Metadata\":[]}";
        assert_eq!(message_body(msg), Some("{\"Metadata\":[]}"));
    }

    #[test]
    fn test_ssml_escapes_text() {
        let msg = ssml_message("req1", "a < b & c > d", "en-US-AriaNeural");
        assert!(msg.contains("a &lt; b &amp; c &gt; d"));
        assert!(msg.contains("name='en-US-AriaNeural'"));
        assert!(msg.contains("Path:ssml"));
    }

    #[test]
    fn test_speech_config_selects_mp3() {
        let msg = speech_config_message();
        assert!(msg.contains("Path:speech.config"));
        assert!(msg.contains(OUTPUT_FORMAT));
    }
}
