//! Axum-based HTTP gateway.
//!
//! One webhook in, at most two sends out. Handlers never surface upstream
//! failures to Meta: the POST endpoint acknowledges with HTTP 200 no matter
//! what happened downstream, because a non-200 only makes Meta redeliver the
//! same event. The sole surfaced failure is webhook verification (403).

use crate::channels::whatsapp::{self, MediaContent, WhatsAppChannel};
use crate::config::Config;
use crate::providers::OpenAiProvider;
use crate::util::{constant_time_eq, truncate_with_ellipsis};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — prevents memory exhaustion
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s) — prevents slow-loris attacks
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub whatsapp: Arc<WhatsAppChannel>,
    pub openai: Arc<OpenAiProvider>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        Self {
            whatsapp: Arc::new(WhatsAppChannel::new(Arc::clone(&config))),
            openai: Arc::new(OpenAiProvider::new(Arc::clone(&config))),
            config,
        }
    }
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/webhook", get(handle_verify))
        .route("/webhook", post(handle_webhook))
        .route("/test-whatsapp", post(handle_test_send))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
}

/// Bind and serve until the process is stopped.
pub async fn run(config: Config, host: &str, port: u16) -> Result<()> {
    let state = AppState::new(config);
    let app = router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    println!("🦀 WaChat gateway listening on http://{addr}");
    println!("  GET  /webhook       — Meta webhook verification");
    println!("  POST /webhook       — WhatsApp message webhook");
    println!("  GET  /health        — health check");
    println!("  POST /test-whatsapp — direct text-send smoke test");
    println!("  Press Ctrl+C to stop.\n");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Webhook verification query params, as Meta spells them.
#[derive(serde::Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// GET /webhook — Meta subscription verification.
async fn handle_verify(
    State(state): State<AppState>,
    Query(params): Query<VerifyQuery>,
) -> impl IntoResponse {
    let token_matches = params
        .verify_token
        .as_deref()
        .is_some_and(|t| constant_time_eq(t, &state.config.verify_token));

    if params.mode.as_deref() == Some("subscribe") && token_matches {
        if let Some(challenge) = params.challenge {
            tracing::info!("webhook verified successfully");
            return (StatusCode::OK, challenge);
        }
        return (StatusCode::BAD_REQUEST, "Missing hub.challenge".to_string());
    }

    tracing::warn!("webhook verification failed — token mismatch");
    (StatusCode::FORBIDDEN, "Verificación falló".to_string())
}

/// POST /webhook — incoming message webhook.
///
/// Always acknowledged with HTTP 200; a malformed body is reported in the
/// JSON status only.
async fn handle_webhook(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("webhook body is not valid JSON: {e}");
            return (
                StatusCode::OK,
                Json(json!({ "status": "error", "message": e.to_string() })),
            );
        }
    };

    let Some(mut message) = whatsapp::normalize(&payload) else {
        tracing::info!("no actionable message in webhook delivery");
        return (StatusCode::OK, Json(json!({ "status": "ok" })));
    };

    tracing::info!(
        "processing {} message {} from {}: {}",
        kind_label(message.kind),
        message.message_id,
        message.sender,
        truncate_with_ellipsis(&message.display_text, 50)
    );

    // Resolve media bytes before composing, so the vision path can see them.
    if let Some(attachment) = message.attachment.as_mut() {
        if attachment.wants_media_fetch() {
            let media_id = attachment
                .media_ref()
                .map(|m| m.id.clone())
                .unwrap_or_default();
            let content = match state.whatsapp.download_media(&media_id).await {
                Ok(encoded) => MediaContent::Base64(encoded),
                Err(e) => {
                    tracing::warn!("media fetch failed for {media_id}: {e}");
                    MediaContent::Unavailable
                }
            };
            if let Some(media) = attachment.media_ref_mut() {
                media.content = content;
            }
        }
    }

    let reply = state
        .openai
        .respond(&message.display_text, message.attachment.as_ref())
        .await;

    let outcome = state
        .whatsapp
        .dispatch(&message.sender, &reply, message.attachment.as_ref())
        .await;

    if outcome.all_sent() {
        tracing::info!("message {} processed", message.message_id);
    } else {
        if !outcome.text_sent {
            tracing::error!("text reply was not delivered to {}", message.sender);
        }
        if !outcome.media_sent {
            tracing::error!("attachment echo was not delivered to {}", message.sender);
        }
    }

    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// GET / — liveness.
async fn handle_root() -> impl IntoResponse {
    Json(json!({
        "message": "WhatsApp OpenAI Bot está ejecutándose",
        "status": "healthy"
    }))
}

/// GET /health — secret presence report.
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let mark = |present: bool| if present { "✓" } else { "✗" };
    Json(json!({
        "status": "healthy",
        "environment_check": {
            "verify_token": mark(!state.config.verify_token.is_empty()),
            "whatsapp_token": mark(!state.config.whatsapp_token.is_empty()),
            "phone_number_id": mark(!state.config.phone_number_id.is_empty()),
            "openai_key": mark(!state.config.openai_api_key.is_empty()),
        }
    }))
}

fn default_test_message() -> String {
    "Mensaje de prueba".to_string()
}

#[derive(serde::Deserialize)]
pub struct TestSendQuery {
    pub phone_number: String,
    #[serde(default = "default_test_message")]
    pub message: String,
}

/// POST /test-whatsapp — operational smoke test for the text-send leg.
async fn handle_test_send(
    State(state): State<AppState>,
    Query(params): Query<TestSendQuery>,
) -> impl IntoResponse {
    tracing::info!("test send to {}", params.phone_number);
    let success = match state
        .whatsapp
        .send_text(&params.phone_number, &params.message)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("test send failed: {e:#}");
            false
        }
    };

    Json(json!({
        "success": success,
        "phone_number": params.phone_number,
        "message": params.message,
        "whatsapp_api_url": state.config.messages_url(),
    }))
}

fn kind_label(kind: whatsapp::MessageKind) -> &'static str {
    use whatsapp::MessageKind;
    match kind {
        MessageKind::Text => "text",
        MessageKind::Image => "image",
        MessageKind::Audio => "audio",
        MessageKind::Document => "document",
        MessageKind::Sticker => "sticker",
        MessageKind::Location => "location",
        MessageKind::Contacts => "contacts",
        MessageKind::Unknown => "unknown",
    }
}
