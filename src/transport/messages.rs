use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Inbound message from the voice agent server, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Final transcript of what the user said
    Transcription { text: String },
    /// Incremental piece of the assistant's response text
    LlmChunk { data: String },
    /// Compressed audio chunk, base64 (optionally as a data URL)
    Audio { data: String },
    /// Server-side failure report
    Error { message: String },
    /// Any discriminant this client does not know
    #[serde(other)]
    Unknown,
}

/// Parse one text frame from the server
pub fn parse_server_message(text: &str) -> Result<ServerMessage> {
    serde_json::from_str(text).map_err(|e| ClientError::MalformedMessage(e.to_string()))
}

/// Decode an audio payload, accepting both bare base64 and
/// `data:<mime>;base64,<payload>` forms.
pub fn decode_audio_payload(data: &str) -> Result<Vec<u8>> {
    let payload = match data.rfind(',') {
        Some(idx) => &data[idx + 1..],
        None => data,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ClientError::MalformedMessage(format!("invalid base64 audio: {}", e)))
}

/// Frame sent from the client to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Raw 16-bit PCM, no envelope
    Binary(Vec<u8>),
    /// Request a graceful close
    Close,
}

/// Event observed on the inbound side of a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    Binary(Vec<u8>),
    /// The connection closed (gracefully or after our close request)
    Closed(Option<String>),
    /// The connection failed; no further events follow
    Error(String),
}
