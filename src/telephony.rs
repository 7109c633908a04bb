//! # Telephony Media-Stream Wire Format
//!
//! Message types for the provider's bidirectional media stream on
//! `/media-stream`.
//!
//! ## Message Format:
//! - **Provider → Server**: JSON with an `event` discriminator.
//!   `start` carries the stream identifier, `media` carries a base64
//!   audio payload. Other kinds are logged and discarded.
//! - **Server → Provider**: JSON `media` events carrying a base64
//!   payload and the session's stream identifier.

use serde::{Deserialize, Serialize};

/// Inbound event on the caller-side media stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    /// Socket-level handshake notification
    Connected,

    /// Stream is starting; carries the provider-assigned stream id
    Start { start: StreamStart },

    /// One frame of caller audio
    Media { media: MediaPayload },

    /// Stream is ending
    Stop,

    /// Any event kind this bridge does not act on
    #[serde(other)]
    Other,
}

/// Payload of a `start` event.
#[derive(Debug, Deserialize)]
pub struct StreamStart {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
}

/// Payload of a `media` event.
#[derive(Debug, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded audio frame
    pub payload: String,
}

/// Outbound `media` event sent back to the caller leg.
///
/// The stream id is `None` (serialized as `null`) if an audio delta
/// arrives before the provider's `start` event has been seen.
#[derive(Debug, Serialize)]
pub struct OutboundMedia {
    /// Always `"media"`
    pub event: &'static str,

    #[serde(rename = "streamSid")]
    pub stream_sid: Option<String>,

    pub media: OutboundPayload,
}

#[derive(Debug, Serialize)]
pub struct OutboundPayload {
    pub payload: String,
}

impl OutboundMedia {
    pub fn new(stream_sid: Option<String>, payload: String) -> Self {
        Self {
            event: "media",
            stream_sid,
            media: OutboundPayload { payload },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_event() {
        let raw = r#"{"event":"start","sequenceNumber":"1","start":{"streamSid":"SID1","accountSid":"AC1","callSid":"CA1"}}"#;
        match serde_json::from_str::<TelephonyEvent>(raw).unwrap() {
            TelephonyEvent::Start { start } => assert_eq!(start.stream_sid, "SID1"),
            other => panic!("Expected start event, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_media_event() {
        let raw = r#"{"event":"media","media":{"track":"inbound","chunk":"2","payload":"QQ=="}}"#;
        match serde_json::from_str::<TelephonyEvent>(raw).unwrap() {
            TelephonyEvent::Media { media } => assert_eq!(media.payload, "QQ=="),
            other => panic!("Expected media event, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_kind_parses_as_other() {
        let raw = r#"{"event":"mark","mark":{"name":"greeting"}}"#;
        assert!(matches!(
            serde_json::from_str::<TelephonyEvent>(raw).unwrap(),
            TelephonyEvent::Other
        ));
    }

    #[test]
    fn test_outbound_media_shape() {
        let msg = OutboundMedia::new(Some("SID1".to_string()), "QQ==".to_string());
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["event"], "media");
        assert_eq!(json["streamSid"], "SID1");
        assert_eq!(json["media"]["payload"], "QQ==");
    }

    #[test]
    fn test_outbound_media_without_stream_sid() {
        let msg = OutboundMedia::new(None, "QQ==".to_string());
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert!(json["streamSid"].is_null());
    }
}
