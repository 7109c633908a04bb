//! # Realtime API Event Types
//!
//! Client and server events for the speech API's realtime WebSocket.
//! All events are JSON with a `type` discriminator.
//!
//! ## Protocol subset used by the bridge:
//!
//! Client events (sent to the API):
//! - `session.update`: one-time session configuration after connect
//! - `input_audio_buffer.append`: one caller audio frame
//!
//! Server events (received from the API):
//! - `response.audio.delta`: synthesized audio for the caller leg
//! - `conversation.item.input_audio_transcription.completed`: caller
//!   utterance transcript
//! - `response.done`: completed agent turn (carries the agent
//!   transcript inside the response output)
//! - `session.created` / `session.updated` / `error`: link lifecycle
//!
//! Everything else is either in the log-worthy set (logged verbatim)
//! or ignored.

use serde::{Deserialize, Serialize};

/// Server event types whose raw payloads are logged at info level for
/// observability. Receipt of these has no other effect.
pub const LOG_EVENT_TYPES: &[&str] = &[
    "response.content.done",
    "rate_limits.updated",
    "response.done",
    "input_audio_buffer.committed",
    "input_audio_buffer.speech_stopped",
    "input_audio_buffer.speech_started",
    "session.created",
    "response.text.done",
    "conversation.item.input_audio_transcription.completed",
];

/// Whether a server event type belongs to the fixed log-worthy set.
pub fn is_log_worthy(event_type: &str) -> bool {
    LOG_EVENT_TYPES.contains(&event_type)
}

// =============================================================================
// Client events
// =============================================================================

/// Event sent from the bridge to the realtime API.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// One-time session configuration, sent shortly after the link opens
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Append one base64 audio frame to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },
}

/// Session configuration for the realtime link. Sent once per
/// connection; never renegotiated mid-call.
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    pub turn_detection: TurnDetection,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub voice: String,
    pub instructions: String,
    pub modalities: Vec<String>,
    pub temperature: f32,
    pub input_audio_transcription: InputAudioTranscription,
}

/// Turn detection configuration. The bridge always uses server-side
/// voice-activity detection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad,
}

/// Transcription sub-model for caller audio.
#[derive(Debug, Clone, Serialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

// =============================================================================
// Server events
// =============================================================================

/// Event received from the realtime API.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Audio chunk for the caller leg
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },

    /// Caller utterance transcribed
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: String },

    /// Agent turn completed
    #[serde(rename = "response.done")]
    ResponseDone { response: ResponseBody },

    #[serde(rename = "session.created")]
    SessionCreated,

    #[serde(rename = "session.updated")]
    SessionUpdated,

    #[serde(rename = "error")]
    Error { error: ApiError },

    /// Any event type the bridge does not act on
    #[serde(other)]
    Other,
}

/// Error payload on a server `error` event.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
}

/// Body of a completed response.
#[derive(Debug, Deserialize)]
pub struct ResponseBody {
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

/// One output item of a completed response.
#[derive(Debug, Deserialize)]
pub struct OutputItem {
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

/// One content part of an output item.
#[derive(Debug, Deserialize)]
pub struct ContentPart {
    pub transcript: Option<String>,
}

/// Placeholder used when a completed response carries no transcript.
pub const AGENT_TRANSCRIPT_PLACEHOLDER: &str = "Agent message not found";

impl ResponseBody {
    /// Extract the agent's spoken transcript: the first content item in
    /// the first output item that carries a transcript field. Falls
    /// back to a placeholder when none is present.
    pub fn agent_transcript(&self) -> String {
        self.output
            .first()
            .and_then(|item| {
                item.content
                    .iter()
                    .find_map(|part| part.transcript.clone())
            })
            .unwrap_or_else(|| AGENT_TRANSCRIPT_PLACEHOLDER.to_string())
    }
}
