//! HTTP route tests, driven through `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use relay_bot::{Role, SessionStore};
use relay_channels::{build_http_router, create_state, ChannelsState, WhatsAppChannel};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const APP_SECRET: &str = "app-secret";

fn whatsapp() -> Arc<WhatsAppChannel> {
    Arc::new(WhatsAppChannel::new(
        "token".into(),
        "123456789".into(),
        Some("verify-me".into()),
        "http://127.0.0.1:9",
    ))
}

fn state_with(
    whatsapp: Option<Arc<WhatsAppChannel>>,
    app_secret: Option<&str>,
) -> (
    Arc<ChannelsState>,
    tokio::sync::mpsc::Receiver<relay_channels::ChannelMessage>,
) {
    create_state(
        whatsapp,
        app_secret.map(str::to_string),
        SessionStore::new(Duration::from_secs(3600)),
    )
}

fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(APP_SECRET.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn text_payload(from: &str, body: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "biz",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "messages": [{
                        "from": from,
                        "id": "wamid.abc",
                        "timestamp": "1700000000",
                        "type": "text",
                        "text": { "body": body }
                    }]
                }
            }]
        }]
    }))
    .unwrap()
}

fn post_webhook(body: Vec<u8>, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook/whatsapp")
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header("X-Hub-Signature-256", sig);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_service() {
    let (state, _rx) = state_with(None, None);

    let response = build_http_router(state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "relaybot");
}

#[tokio::test]
async fn ready_counts_sessions() {
    let (state, _rx) = state_with(None, None);
    state.sessions.append("+1", Role::User, "a");
    state.sessions.append("+2", Role::User, "b");

    let response = build_http_router(state)
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["sessions"], 2);
}

#[tokio::test]
async fn ready_fails_once_dispatcher_is_gone() {
    let (state, rx) = state_with(None, None);
    drop(rx);

    let response = build_http_router(state)
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn verification_handshake_echoes_challenge() {
    let (state, _rx) = state_with(Some(whatsapp()), None);

    let response = build_http_router(state)
        .oneshot(
            Request::builder()
                .uri("/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1158201444")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"1158201444");
}

#[tokio::test]
async fn verification_with_wrong_token_is_forbidden() {
    let (state, _rx) = state_with(Some(whatsapp()), None);

    let response = build_http_router(state)
        .oneshot(
            Request::builder()
                .uri("/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn webhook_without_whatsapp_is_not_found() {
    let (state, _rx) = state_with(None, None);

    let response = build_http_router(state)
        .oneshot(post_webhook(text_payload("15550100", "hi"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_forwards_text_messages() {
    let (state, mut rx) = state_with(Some(whatsapp()), None);

    let response = build_http_router(state)
        .oneshot(post_webhook(text_payload("15550100", "open sesame hi"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let msg = rx.try_recv().unwrap();
    assert_eq!(msg.correspondent(), "+15550100");
    assert_eq!(msg.text_content(), Some("open sesame hi"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn signed_webhook_is_accepted() {
    let (state, mut rx) = state_with(Some(whatsapp()), Some(APP_SECRET));
    let body = text_payload("15550100", "hello");
    let signature = sign(&body);

    let response = build_http_router(state)
        .oneshot(post_webhook(body, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn bad_or_missing_signature_is_rejected() {
    let (state, mut rx) = state_with(Some(whatsapp()), Some(APP_SECRET));
    let app = build_http_router(state);

    let body = text_payload("15550100", "hello");
    let tampered = text_payload("15550100", "reboot");
    let response = app
        .clone()
        .oneshot(post_webhook(tampered, Some(sign(&body))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.oneshot(post_webhook(body, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn invalid_json_is_a_bad_request() {
    let (state, _rx) = state_with(Some(whatsapp()), None);

    let response = build_http_router(state)
        .oneshot(post_webhook(b"{not json".to_vec(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_callbacks_are_acknowledged() {
    let (state, mut rx) = state_with(Some(whatsapp()), None);
    let body = serde_json::to_vec(&json!({
        "entry": [{ "changes": [{ "value": {
            "statuses": [{ "id": "wamid.abc", "status": "read" }]
        }}]}]
    }))
    .unwrap();

    let response = build_http_router(state)
        .oneshot(post_webhook(body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (state, _rx) = state_with(Some(whatsapp()), None);
    let body = vec![b' '; relay_channels::MAX_BODY_BYTES + 1];

    let response = build_http_router(state)
        .oneshot(post_webhook(body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
