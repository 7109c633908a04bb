use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Root status endpoint: static service identification plus current
/// call/request metrics.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();

    HttpResponse::Ok().json(json!({
        "message": "Twilio media stream bridge is running!",
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": "call-bridge-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "active_calls": metrics.active_calls,
            "active_sessions": state.registry.active_count()
        }
    }))
}
