//! # Incoming-Call Handler
//!
//! Answers the telephony provider's incoming-call webhook with TwiML
//! instructing the provider to speak the configured greeting and open
//! a bidirectional media stream back to this server's relay endpoint.
//!
//! Registered for any HTTP verb; no body validation is performed, and
//! malformed requests receive the same static response.

use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::info;

/// Build the TwiML document for one incoming call. The stream target
/// uses the secure WebSocket scheme against the requesting host.
fn call_control_markup(greeting: &str, host: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Say>{greeting}</Say>
    <Connect>
        <Stream url="wss://{host}/media-stream" />
    </Connect>
</Response>"#
    )
}

pub async fn incoming_call(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    info!("Incoming call");

    let greeting = state.get_config().agent.greeting;
    let host = req.connection_info().host().to_string();

    HttpResponse::Ok()
        .content_type("text/xml")
        .body(call_control_markup(&greeting, &host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_incoming_call_points_stream_at_request_host() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/incoming-call", web::route().to(incoming_call)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/incoming-call")
            .insert_header(("host", "bridge.example.com"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let content_type = resp
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/xml"));

        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(body.contains(r#"<Stream url="wss://bridge.example.com/media-stream" />"#));
        assert!(body.contains("<Say>"));
    }

    #[actix_web::test]
    async fn test_incoming_call_answers_get_too() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/incoming-call", web::route().to(incoming_call)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/incoming-call")
            .insert_header(("host", "bridge.example.com"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[::core::prelude::v1::test]
    fn test_markup_contains_greeting() {
        let markup = call_control_markup("Hello caller", "h.example.com");
        assert!(markup.contains("<Say>Hello caller</Say>"));
        assert!(markup.starts_with("<?xml"));
    }
}
