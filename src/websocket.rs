//! # Media-Stream Relay Actor
//!
//! Handles one phone call's bidirectional audio relay. The telephony
//! provider connects to `/media-stream`; each connection gets its own
//! actor, which opens an outbound realtime link to the speech API and
//! runs two forwarding paths for the lifetime of the call:
//!
//! - **Caller → Speech API**: `media` frames are wrapped in
//!   `input_audio_buffer.append` events and forwarded, but only while
//!   the realtime link is open. Frames arriving before the link opens
//!   (or after it closes) are silently dropped, never buffered.
//! - **Speech API → Caller**: `response.audio.delta` payloads are
//!   forwarded to the caller as `media` events tagged with the
//!   session's stream id. Transcription and response-done events feed
//!   the session transcript as a side effect.
//!
//! Parse failures on either path are logged with the offending raw
//! message and never terminate the relay.
//!
//! On disconnect the link is torn down, the post-call extractor runs
//! over the final transcript in a background task, and the session is
//! deleted from the registry only after that task finishes.

use crate::config::AppConfig;
use crate::extractor::Extractor;
use crate::call::CallSession;
use crate::realtime::events::{is_log_worthy, ClientEvent, ServerEvent};
use crate::realtime::link;
use crate::state::AppState;
use crate::telephony::{OutboundMedia, TelephonyEvent};

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, StreamHandler};
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use base64::prelude::*;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WireMessage;
use tracing::{debug, error, info, warn};

/// Telephony header carrying the provider's call identifier.
const CALL_SID_HEADER: &str = "x-twilio-call-sid";

/// The realtime link is open; carries the sender for outbound events.
#[derive(Message)]
#[rtype(result = "()")]
struct LinkOpened {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

/// The realtime link closed (remote close or error). No reconnect.
#[derive(Message)]
#[rtype(result = "()")]
struct LinkClosed;

/// One raw text message from the realtime link.
#[derive(Message)]
#[rtype(result = "()")]
struct ApiMessage(String);

/// WebSocket actor for one call's media stream.
pub struct MediaStreamSocket {
    state: AppState,
    config: AppConfig,
    session: Arc<CallSession>,

    /// Sender toward the speech API; `None` until the link opens and
    /// again after it closes. The open-state check before every
    /// forwarded frame.
    api_tx: Option<mpsc::UnboundedSender<ClientEvent>>,
}

impl MediaStreamSocket {
    pub fn new(state: AppState, config: AppConfig, session: Arc<CallSession>) -> Self {
        Self {
            state,
            config,
            session,
            api_tx: None,
        }
    }

    /// Handle one inbound caller-side frame.
    fn handle_caller_message(&mut self, text: &str) {
        match serde_json::from_str::<TelephonyEvent>(text) {
            Ok(TelephonyEvent::Media { media }) => {
                if let Some(tx) = &self.api_tx {
                    let _ = tx.send(ClientEvent::InputAudioAppend {
                        audio: media.payload,
                    });
                }
                // Link not open: frame dropped, no buffering
            }
            Ok(TelephonyEvent::Start { start }) => {
                self.session.set_stream_sid(start.stream_sid.clone());
                info!(
                    call_id = %self.session.call_id(),
                    stream_sid = %start.stream_sid,
                    "Incoming stream has started"
                );
            }
            Ok(_) => {
                debug!(call_id = %self.session.call_id(), raw = %text, "Received non-media event");
            }
            Err(err) => {
                error!(
                    call_id = %self.session.call_id(),
                    error = %err,
                    raw = %text,
                    "Error parsing caller message"
                );
            }
        }
    }

    /// Handle one message from the realtime link.
    fn handle_api_message(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                error!(error = %err, raw = %text, "Error processing realtime message");
                return;
            }
        };

        // The fixed log-worthy set is logged verbatim, then handling
        // proceeds normally.
        if let Some(event_type) = value.get("type").and_then(|v| v.as_str()) {
            if is_log_worthy(event_type) {
                info!(event = %event_type, payload = %text, "Received realtime event");
            }
        }

        match serde_json::from_value::<ServerEvent>(value) {
            Ok(ServerEvent::AudioDelta { delta }) => {
                let out = OutboundMedia::new(
                    self.session.stream_sid(),
                    normalize_audio_payload(&delta),
                );
                match serde_json::to_string(&out) {
                    Ok(json) => ctx.text(json),
                    Err(err) => error!(error = %err, "Failed to encode media event"),
                }
            }
            Ok(ServerEvent::TranscriptionCompleted { transcript }) => {
                self.session.append_user(&transcript);
            }
            Ok(ServerEvent::ResponseDone { response }) => {
                self.session.append_agent(&response.agent_transcript());
            }
            Ok(ServerEvent::SessionUpdated) => {
                info!(call_id = %self.session.call_id(), "Session updated successfully");
            }
            Ok(ServerEvent::Error { error }) => {
                error!(
                    call_id = %self.session.call_id(),
                    error_type = %error.error_type,
                    message = %error.message,
                    "Realtime API error"
                );
            }
            Ok(_) => {}
            Err(err) => {
                error!(error = %err, raw = %text, "Error processing realtime message");
            }
        }
    }

    /// Spawn the per-call realtime link: connect, send the one-time
    /// session configuration after a settle delay, pump outbound events
    /// from the channel, and feed inbound messages back to the actor.
    fn spawn_link(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let addr = ctx.address();
        let openai = self.config.openai.clone();
        let instructions = self.config.agent.instructions.clone();
        let call_id = self.session.call_id().to_string();

        tokio::spawn(async move {
            let stream = match link::connect(&openai).await {
                Ok(stream) => stream,
                Err(err) => {
                    // Caller leg stays up; its frames are dropped.
                    error!(call_id = %call_id, error = %err, "Failed to open realtime link");
                    return;
                }
            };

            let (mut sink, mut reader) = stream.split();
            let (tx, mut rx) = mpsc::unbounded_channel::<ClientEvent>();

            addr.do_send(LinkOpened { tx: tx.clone() });

            // Writer: serialize and push everything queued for the API.
            let writer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match serde_json::to_string(&event) {
                        Ok(text) => {
                            if sink.send(WireMessage::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => error!(error = %err, "Failed to encode client event"),
                    }
                }
                let _ = sink.close().await;
            });

            // One-time session configuration, delayed past link readiness.
            let update = link::session_update(&openai, &instructions);
            tokio::spawn(async move {
                tokio::time::sleep(link::SESSION_UPDATE_DELAY).await;
                debug!("Sending session update");
                let _ = tx.send(update);
            });

            pump_api_messages(reader, addr.clone().recipient(), &call_id).await;

            addr.do_send(LinkClosed);
            let _ = writer.await;
            info!(call_id = %call_id, "Disconnected from the realtime API");
        });
    }
}

impl Actor for MediaStreamSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(call_id = %self.session.call_id(), "Media stream connected");
        self.state.increment_active_calls();
        self.spawn_link(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Dropping the sender closes the upstream write side; the link
        // task finishes on its own.
        self.api_tx = None;
        self.state.decrement_active_calls();

        let call_id = self.session.call_id().to_string();
        let transcript = self.session.transcript();
        let registry = self.state.registry.clone();
        let extractor = Extractor::new(self.config.clone());

        info!(call_id = %call_id, "Client disconnected");
        info!(call_id = %call_id, "Full transcript:\n{}", transcript);

        // Post-call extraction runs off the dispatch path. The session
        // is removed only after it finishes, so a stalled downstream
        // call leaks at most this one entry.
        tokio::spawn(async move {
            extractor.process(&call_id, &transcript).await;
            registry.remove(&call_id);
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MediaStreamSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_caller_message(&text),
            Ok(ws::Message::Ping(data)) => ctx.pong(&data),
            Ok(ws::Message::Close(reason)) => {
                info!(call_id = %self.session.call_id(), reason = ?reason, "Media stream closed");
                ctx.stop();
            }
            Ok(_) => {
                warn!(call_id = %self.session.call_id(), "Unexpected frame on media stream");
            }
            Err(err) => {
                error!(call_id = %self.session.call_id(), error = %err, "Media stream protocol error");
                ctx.stop();
            }
        }
    }
}

impl Handler<LinkOpened> for MediaStreamSocket {
    type Result = ();

    fn handle(&mut self, msg: LinkOpened, _ctx: &mut Self::Context) {
        info!(call_id = %self.session.call_id(), "Realtime link open");
        self.api_tx = Some(msg.tx);
    }
}

impl Handler<LinkClosed> for MediaStreamSocket {
    type Result = ();

    fn handle(&mut self, _msg: LinkClosed, _ctx: &mut Self::Context) {
        self.api_tx = None;
    }
}

impl Handler<ApiMessage> for MediaStreamSocket {
    type Result = ();

    fn handle(&mut self, msg: ApiMessage, ctx: &mut Self::Context) {
        self.handle_api_message(&msg.0, ctx);
    }
}

/// Forward realtime link messages to the relay actor until the remote
/// closes or errors.
///
/// Delivery uses `do_send`: deltas arrive in tight bursts from the
/// reader task, and a momentarily full mailbox must not be treated as
/// link failure. If the actor is already gone the messages are dropped
/// and the loop ends with the link's own close.
async fn pump_api_messages<S>(mut reader: S, relay: actix::Recipient<ApiMessage>, call_id: &str)
where
    S: futures_util::Stream<Item = Result<WireMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    while let Some(msg) = reader.next().await {
        match msg {
            Ok(WireMessage::Text(text)) => {
                relay.do_send(ApiMessage(text));
            }
            Ok(WireMessage::Close(frame)) => {
                info!(call_id = %call_id, frame = ?frame, "Realtime link closed by remote");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                error!(call_id = %call_id, error = %err, "Realtime link error");
                break;
            }
        }
    }
}

/// Re-encode an audio delta for the caller leg. Invalid base64 is
/// forwarded unchanged rather than dropped (best-effort path).
fn normalize_audio_payload(delta: &str) -> String {
    match BASE64_STANDARD.decode(delta) {
        Ok(bytes) => BASE64_STANDARD.encode(bytes),
        Err(err) => {
            debug!(error = %err, "Audio delta is not valid base64, forwarding as-is");
            delta.to_string()
        }
    }
}

/// Resolve the call id from the telephony header, or fall back to a
/// timestamp-based id if the header is absent.
fn resolve_call_id(req: &HttpRequest) -> String {
    req.headers()
        .get(CALL_SID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("session_{}", chrono::Utc::now().timestamp_millis()))
}

/// WebSocket endpoint handler: upgrades `/media-stream` and hands the
/// connection to a fresh relay actor.
pub async fn media_stream(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let call_id = resolve_call_id(&req);
    let config = app_state.get_config();
    let session = app_state.registry.open(&call_id);

    info!(call_id = %call_id, "Client connected");

    ws::start(
        MediaStreamSocket::new(app_state.get_ref().clone(), config, session),
        &req,
        stream,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use futures_util::stream;
    use std::sync::Mutex;

    fn test_socket() -> MediaStreamSocket {
        let state = AppState::new(AppConfig::default());
        let session = state.registry.open("CA1");
        MediaStreamSocket::new(state, AppConfig::default(), session)
    }

    #[test]
    fn test_media_frame_dropped_until_link_opens() {
        let mut socket = test_socket();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let frame = r#"{"event":"media","media":{"payload":"QQ=="}}"#;

        // Before the link opens: dropped, not buffered
        socket.handle_caller_message(frame);

        socket.api_tx = Some(tx);
        socket.handle_caller_message(frame);

        match rx.try_recv().unwrap() {
            ClientEvent::InputAudioAppend { audio } => assert_eq!(audio, "QQ=="),
            other => panic!("Expected audio append, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_start_frame_records_stream_sid() {
        let mut socket = test_socket();
        socket.handle_caller_message(r#"{"event":"start","start":{"streamSid":"SID1"}}"#);
        assert_eq!(socket.session.stream_sid(), Some("SID1".to_string()));
    }

    #[test]
    fn test_malformed_caller_frame_forwards_nothing() {
        let mut socket = test_socket();
        let (tx, mut rx) = mpsc::unbounded_channel();
        socket.api_tx = Some(tx);

        socket.handle_caller_message("not json");

        assert!(rx.try_recv().is_err());
    }

    struct Collector {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Actor for Collector {
        type Context = actix::Context<Self>;
    }

    impl Handler<ApiMessage> for Collector {
        type Result = ();

        fn handle(&mut self, msg: ApiMessage, _ctx: &mut Self::Context) {
            self.seen.lock().unwrap().push(msg.0);
        }
    }

    #[actix_web::test]
    async fn test_link_message_burst_all_delivered() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let addr = Collector { seen: seen.clone() }.start();

        // Well past the default mailbox capacity, delivered faster than
        // the actor can drain.
        let mut frames: Vec<Result<WireMessage, tokio_tungstenite::tungstenite::Error>> = (0..64)
            .map(|i| Ok(WireMessage::Text(format!("delta-{}", i))))
            .collect();
        frames.push(Ok(WireMessage::Close(None)));

        pump_api_messages(stream::iter(frames), addr.clone().recipient(), "CA1").await;

        // Let the actor drain its mailbox
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 64);
        assert_eq!(seen[0], "delta-0");
        assert_eq!(seen[63], "delta-63");
    }

    #[test]
    fn test_resolve_call_id_from_header() {
        let req = TestRequest::default()
            .insert_header((CALL_SID_HEADER, "CA12345"))
            .to_http_request();
        assert_eq!(resolve_call_id(&req), "CA12345");
    }

    #[test]
    fn test_resolve_call_id_fallback() {
        let req = TestRequest::default().to_http_request();
        assert!(resolve_call_id(&req).starts_with("session_"));
    }

    #[test]
    fn test_normalize_audio_payload_roundtrip() {
        assert_eq!(normalize_audio_payload("QQ=="), "QQ==");
    }

    #[test]
    fn test_normalize_audio_payload_invalid_base64() {
        // Best-effort: bad payloads pass through unchanged
        assert_eq!(normalize_audio_payload("not base64!!"), "not base64!!");
    }
}
