//! Defines the WebSocket message protocol between the browser client and the API server.

use crate::audio_utils;
use bytes::Bytes;
use cadence_core::history::TurnItem;
use serde::{Deserialize, Serialize};

/// Messages sent from the client (browser) to the server as JSON text frames.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replaces the server-side history with the client's copy.
    Sync {
        inputs: Vec<TurnItem>,
        #[serde(default)]
        reset_agent: bool,
    },
    /// A typed user message.
    Text { text: String },
    /// A chunk of the utterance being recorded (base64 PCM16).
    AudioChunk { data: String },
    /// The utterance is finished.
    AudioComplete,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A fragment of the agent's text reply.
    TextDelta { delta: String },
    /// A frame of synthesized audio (base64 PCM16).
    Audio { data: String },
    /// The full committed history, sent before each turn's terminal marker.
    HistoryUpdated { inputs: Vec<TurnItem> },
    /// The triggered turn finished.
    TurnComplete,
    /// The triggered turn failed; the connection stays usable.
    TurnError { message: String },
    /// A session-level problem outside of any turn.
    Error { message: String },
}

impl ServerMessage {
    pub fn audio(data: &[u8]) -> Self {
        ServerMessage::Audio {
            data: audio_utils::encode_audio(data),
        }
    }

    /// True for the markers that end a triggered turn.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerMessage::TurnComplete | ServerMessage::TurnError { .. }
        )
    }
}

/// The classification of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundKind {
    Sync {
        inputs: Vec<TurnItem>,
        reset_agent: bool,
    },
    NewText(String),
    AudioChunk(Bytes),
    AudioComplete,
    /// Unrecognized or malformed; the reason is for logging only.
    Invalid(String),
}

/// Classifies a decoded JSON frame. Never fails: anything unrecognized is
/// `Invalid`.
pub fn classify(raw: serde_json::Value) -> InboundKind {
    match serde_json::from_value::<ClientMessage>(raw) {
        Ok(ClientMessage::Sync {
            inputs,
            reset_agent,
        }) => InboundKind::Sync {
            inputs,
            reset_agent,
        },
        Ok(ClientMessage::Text { text }) => InboundKind::NewText(text),
        Ok(ClientMessage::AudioChunk { data }) => match audio_utils::decode_audio(&data) {
            Ok(bytes) => InboundKind::AudioChunk(bytes),
            Err(e) => InboundKind::Invalid(format!("audio_chunk payload is not base64: {}", e)),
        },
        Ok(ClientMessage::AudioComplete) => InboundKind::AudioComplete,
        Err(e) => InboundKind::Invalid(e.to_string()),
    }
}

/// Classifies the body of a text frame.
pub fn classify_text(text: &str) -> InboundKind {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => classify(value),
        Err(e) => InboundKind::Invalid(format!("frame is not JSON: {}", e)),
    }
}
