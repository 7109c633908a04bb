//! # Realtime Link Setup
//!
//! Establishes the authenticated outbound WebSocket to the speech API
//! and builds the one-time `session.update` configuration event.
//!
//! One link is opened per call when the caller connects and torn down
//! when the caller disconnects or on the link's own error/close. Links
//! are never pooled, reused, or reconnected.

use crate::config::OpenAiConfig;
use crate::error::{AppError, AppResult};
use crate::realtime::events::{
    ClientEvent, InputAudioTranscription, SessionConfig, TurnDetection,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::info;

/// Delay between the link opening and the `session.update` being sent,
/// to avoid racing the link's own readiness.
pub const SESSION_UPDATE_DELAY: Duration = Duration::from_millis(250);

/// The connected realtime WebSocket stream.
pub type RealtimeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the realtime link for one call.
///
/// Authenticates with the bearer credential and the beta-feature
/// header. Any handshake failure is surfaced as an upstream error; the
/// caller leg is expected to keep running (frames are dropped) when
/// this fails.
pub async fn connect(openai: &OpenAiConfig) -> AppResult<RealtimeStream> {
    let url = format!("{}?model={}", openai.realtime_base, openai.realtime_model);

    let mut request = url.into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        "Authorization",
        format!("Bearer {}", openai.api_key)
            .parse()
            .map_err(|_| AppError::Upstream("API key is not a valid header value".to_string()))?,
    );
    headers.insert(
        "OpenAI-Beta",
        "realtime=v1"
            .parse()
            .map_err(|_| AppError::Upstream("invalid beta header value".to_string()))?,
    );

    let (stream, _response) = connect_async(request).await?;
    info!(model = %openai.realtime_model, "Connected to the realtime API");

    Ok(stream)
}

/// Build the one-time session configuration event: voice identity,
/// G.711 u-law audio both ways, server-side VAD, persona instructions,
/// text+audio modalities, temperature, and the caller-audio
/// transcription sub-model.
pub fn session_update(openai: &OpenAiConfig, instructions: &str) -> ClientEvent {
    ClientEvent::SessionUpdate {
        session: SessionConfig {
            turn_detection: TurnDetection::ServerVad,
            input_audio_format: "g711_ulaw".to_string(),
            output_audio_format: "g711_ulaw".to_string(),
            voice: openai.voice.clone(),
            instructions: instructions.to_string(),
            modalities: vec!["text".to_string(), "audio".to_string()],
            temperature: openai.temperature,
            input_audio_transcription: InputAudioTranscription {
                model: openai.transcription_model.clone(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_session_update_uses_configured_values() {
        let mut config = AppConfig::default();
        config.openai.voice = "verse".to_string();
        config.openai.temperature = 0.6;

        let event = session_update(&config.openai, "Persona text");
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "session.update");
        assert_eq!(json["session"]["voice"], "verse");
        assert_eq!(json["session"]["instructions"], "Persona text");
        assert_eq!(json["session"]["output_audio_format"], "g711_ulaw");
        let temperature = json["session"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.6).abs() < 1e-6);
    }
}
