use std::time::Duration;

use echome_remote::{
    ConversationStore, HttpConversationStore, RemoteConfig, RemoteError, RetryPolicy,
    SendMessageRequest, SessionId, UserId,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user(raw: &str) -> UserId {
    UserId::parse(raw).expect("user id")
}

fn session(raw: &str) -> SessionId {
    SessionId::parse(raw).expect("session id")
}

fn store_for(server: &MockServer) -> HttpConversationStore {
    let retry = RetryPolicy {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        ..RetryPolicy::default()
    };
    HttpConversationStore::new(
        RemoteConfig::new(server.uri())
            .with_request_timeout(Duration::from_millis(500))
            .with_retry(retry),
    )
    .expect("store")
}

#[tokio::test]
async fn lists_sessions_in_listing_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/u1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!(["1700000000000", "  ", "Chat 7"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let sessions = store_for(&server)
        .list_sessions(&user("u1"))
        .await
        .expect("sessions");

    assert_eq!(sessions, vec![session("1700000000000"), session("Chat 7")]);
}

#[tokio::test]
async fn listed_ids_are_requested_back_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([" abc"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chats/u1/%20abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let sessions = store.list_sessions(&user("u1")).await.expect("sessions");
    assert_eq!(sessions[0].as_str(), " abc");

    let messages = store
        .list_messages(&user("u1"), &sessions[0])
        .await
        .expect("messages");
    assert!(messages.is_empty());
}

#[tokio::test]
async fn lists_messages_for_one_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chats/u1/1700000000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "message": "hi",
                "aiResponse": "hello",
                "date": "2023-11-14T22:13:20Z",
                "summary": "greeting",
                "emotions": { "joy": 0.9 }
            },
            { "message": "again", "aiResponse": "still here" }
        ])))
        .mount(&server)
        .await;

    let messages = store_for(&server)
        .list_messages(&user("u1"), &session("1700000000000"))
        .await
        .expect("messages");

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].message, "hi");
    assert_eq!(messages[0].ai_response, "hello");
    assert_eq!(messages[0].summary.as_deref(), Some("greeting"));
    assert_eq!(messages[0].emotions, Some(json!({ "joy": 0.9 })));
    assert!(messages[0].sent_at().is_some());
    assert_eq!(messages[1].sent_at(), None);
}

#[tokio::test]
async fn posts_chat_messages_with_the_discriminator() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/message"))
        .and(body_json(json!({
            "userId": "u1",
            "sessionId": "1700000000000",
            "message": "bye",
            "type": "chat"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reply": "see you",
            "entry": { "summary": "farewell", "emotions": ["calm"] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = store_for(&server)
        .send_message(SendMessageRequest::chat(
            user("u1"),
            session("1700000000000"),
            "bye",
        ))
        .await
        .expect("reply");

    assert_eq!(response.reply, "see you");
    let entry = response.entry.expect("entry");
    assert_eq!(entry.summary.as_deref(), Some("farewell"));
    assert_eq!(entry.emotions, Some(json!(["calm"])));
}

#[tokio::test]
async fn failed_send_surfaces_server_error_and_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/message"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "error": "model offline" })))
        .expect(1)
        .mount(&server)
        .await;

    let error = store_for(&server)
        .send_message(SendMessageRequest::chat(user("u1"), session("1"), "bye"))
        .await
        .expect_err("send should fail");

    match error {
        RemoteError::Status {
            status, message, ..
        } => {
            assert_eq!(status, 503);
            assert_eq!(message, "model offline");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn listings_retry_server_errors_until_the_budget_is_spent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/u1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let error = store_for(&server)
        .list_sessions(&user("u1"))
        .await
        .expect_err("listing should fail");

    assert!(matches!(error, RemoteError::Status { status: 500, .. }));
}

#[tokio::test]
async fn listings_recover_when_a_retry_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/u1"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["42"])))
        .expect(1)
        .mount(&server)
        .await;

    let sessions = store_for(&server)
        .list_sessions(&user("u1"))
        .await
        .expect("sessions after retry");

    assert_eq!(sessions, vec![session("42")]);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chats/u1/9"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .expect(1)
        .mount(&server)
        .await;

    let error = store_for(&server)
        .list_messages(&user("u1"), &session("9"))
        .await
        .expect_err("listing should fail");

    assert!(matches!(
        error,
        RemoteError::Status { status: 404, ref message, .. } if message == "Server error"
    ));
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/message"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "reply": "late" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let error = store_for(&server)
        .send_message(SendMessageRequest::chat(user("u1"), session("1"), "hi"))
        .await
        .expect_err("request should time out");

    assert!(error.is_retryable(), "timeouts are transient: {error}");
}

#[tokio::test]
async fn malformed_success_payload_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/message"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": true })))
        .mount(&server)
        .await;

    let error = store_for(&server)
        .send_message(SendMessageRequest::chat(user("u1"), session("1"), "hi"))
        .await
        .expect_err("missing reply field");

    assert!(matches!(error, RemoteError::DecodePayload { .. }));
}
