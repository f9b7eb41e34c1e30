//! Graph API contract for the WhatsApp adapter against a mock server.

use relay_channels::{Channel, ChannelError, ChannelType, OutgoingMessage, WhatsAppChannel};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn channel_for(server: &MockServer) -> WhatsAppChannel {
    WhatsAppChannel::new(
        "test-token".into(),
        "123456789".into(),
        None,
        &format!("{}/v18.0", server.uri()),
    )
}

fn reply(to: &str, text: &str) -> OutgoingMessage {
    OutgoingMessage {
        channel_type: ChannelType::WhatsApp,
        channel_id: to.into(),
        text: text.into(),
    }
}

#[tokio::test]
async fn send_posts_text_message_without_plus() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v18.0/123456789/messages"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": "15550100",
            "type": "text",
            "text": { "preview_url": false, "body": "Hello!" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messaging_product": "whatsapp",
            "contacts": [{ "input": "15550100", "wa_id": "15550100" }],
            "messages": [{ "id": "wamid.sent" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = channel_for(&server)
        .send(reply("+15550100", "Hello!"))
        .await
        .unwrap();

    assert_eq!(id, "wamid.sent");
}

#[tokio::test]
async fn api_error_is_send_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v18.0/123456789/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Invalid OAuth access token" }
        })))
        .mount(&server)
        .await;

    let err = channel_for(&server)
        .send(reply("+15550100", "Hello!"))
        .await
        .unwrap_err();

    match err {
        ChannelError::SendFailed(msg) => assert!(msg.contains("401")),
        other => panic!("expected SendFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn init_checks_phone_number() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v18.0/123456789"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "123456789",
            "display_phone_number": "+1 555 0100"
        })))
        .mount(&server)
        .await;

    let mut channel = channel_for(&server);
    channel.init().await.unwrap();
    assert!(channel.is_connected());
    assert!(channel.health_check().await.is_ok());

    channel.shutdown().await.unwrap();
    assert!(!channel.is_connected());
}

#[tokio::test]
async fn init_with_rejected_token_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v18.0/123456789"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let mut channel = channel_for(&server);
    let err = channel.init().await.unwrap_err();
    assert!(matches!(err, ChannelError::Auth(_)));
    assert!(!channel.is_connected());
}
