//! HTTP routes for the relay bot.
//!
//! - `GET /health` liveness
//! - `GET /ready` readiness plus live session count
//! - `GET /webhook/whatsapp` Meta verification handshake
//! - `POST /webhook/whatsapp` inbound WhatsApp messages

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use relay_bot::SessionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::message::ChannelMessage;
use crate::whatsapp::WhatsAppChannel;

/// Inbound queue depth between the webhook handlers and the dispatcher.
pub const MESSAGE_QUEUE_CAPACITY: usize = 100;

const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

// ============================================================================
// State
// ============================================================================

/// Shared state for the HTTP server.
pub struct ChannelsState {
    /// WhatsApp channel instance (if configured)
    pub whatsapp: Option<Arc<WhatsAppChannel>>,
    /// App secret for `X-Hub-Signature-256` verification
    pub whatsapp_app_secret: Option<Arc<str>>,
    /// Queue feeding the dispatcher
    pub message_tx: mpsc::Sender<ChannelMessage>,
    /// Sessions, for readiness reporting
    pub sessions: SessionStore,
}

/// Create the server state and the receiving half of the inbound queue.
pub fn create_state(
    whatsapp: Option<Arc<WhatsAppChannel>>,
    whatsapp_app_secret: Option<String>,
    sessions: SessionStore,
) -> (Arc<ChannelsState>, mpsc::Receiver<ChannelMessage>) {
    let (tx, rx) = mpsc::channel(MESSAGE_QUEUE_CAPACITY);

    let state = Arc::new(ChannelsState {
        whatsapp,
        whatsapp_app_secret: whatsapp_app_secret
            .filter(|s| !s.is_empty())
            .map(Arc::from),
        message_tx: tx,
        sessions,
    });

    (state, rx)
}

/// Build the axum router.
pub fn build_router(state: Arc<ChannelsState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route(
            "/webhook/whatsapp",
            get(whatsapp_verify).post(whatsapp_webhook),
        )
        .with_state(state)
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct WebhookResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl WebhookResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
        })
    }

    fn error(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            message: Some(message.into()),
        })
    }
}

// ============================================================================
// Health Routes
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "relaybot",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ready(State(state): State<Arc<ChannelsState>>) -> impl IntoResponse {
    let sessions = state.sessions.len();

    if state.message_tx.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not_ready",
                sessions,
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadyResponse {
            status: "ready",
            sessions,
        }),
    )
}

// ============================================================================
// WhatsApp Webhook
// ============================================================================

#[derive(Debug, Deserialize)]
struct WhatsAppVerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Check an `X-Hub-Signature-256` header (`sha256=<hex>`) against the body.
pub fn verify_whatsapp_signature(app_secret: &str, body: &[u8], signature_header: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let Some(expected) = signature_header
        .strip_prefix("sha256=")
        .and_then(|sig| hex::decode(sig).ok())
    else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    // verify_slice compares in constant time
    mac.verify_slice(&expected).is_ok()
}

fn tokens_match(given: &str, expected: &str) -> bool {
    given.len() == expected.len()
        && given
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// GET /webhook/whatsapp
async fn whatsapp_verify(
    State(state): State<Arc<ChannelsState>>,
    Query(params): Query<WhatsAppVerifyQuery>,
) -> (StatusCode, String) {
    let Some(whatsapp) = &state.whatsapp else {
        return (
            StatusCode::NOT_FOUND,
            "WhatsApp channel not configured".to_string(),
        );
    };

    let token_ok = match (params.verify_token.as_deref(), whatsapp.verify_token()) {
        (Some(given), Some(expected)) => tokens_match(given, expected),
        _ => false,
    };

    if params.mode.as_deref() == Some("subscribe") && token_ok {
        return match params.challenge {
            Some(challenge) => {
                tracing::info!("WhatsApp webhook verified");
                (StatusCode::OK, challenge)
            }
            None => (StatusCode::BAD_REQUEST, "Missing hub.challenge".to_string()),
        };
    }

    tracing::warn!("WhatsApp webhook verification failed: token mismatch");
    (StatusCode::FORBIDDEN, "Forbidden".to_string())
}

/// POST /webhook/whatsapp
async fn whatsapp_webhook(
    State(state): State<Arc<ChannelsState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(whatsapp) = &state.whatsapp else {
        return (
            StatusCode::NOT_FOUND,
            WebhookResponse::error("WhatsApp channel not configured"),
        );
    };

    if let Some(app_secret) = &state.whatsapp_app_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !verify_whatsapp_signature(app_secret, &body, signature) {
            tracing::warn!(
                signature = if signature.is_empty() { "missing" } else { "invalid" },
                "WhatsApp webhook signature rejected"
            );
            return (
                StatusCode::UNAUTHORIZED,
                WebhookResponse::error("Invalid signature"),
            );
        }
    }

    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            WebhookResponse::error("Invalid JSON payload"),
        );
    };

    for msg in whatsapp.parse_webhook_payload(&payload) {
        tracing::debug!(
            trace_id = %msg.trace_id,
            from = %msg.user_id,
            message_id = %msg.id,
            "WhatsApp message received"
        );

        if let Err(e) = state.message_tx.send(msg).await {
            tracing::error!(error = %e, "Dispatcher queue closed, dropping WhatsApp message");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                WebhookResponse::error("Dispatcher unavailable"),
            );
        }
    }

    // Status-only callbacks are acknowledged too
    (StatusCode::OK, WebhookResponse::ok())
}
