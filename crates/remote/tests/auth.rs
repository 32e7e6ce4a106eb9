use echome_remote::{AuthConfig, PasswordAuthClient, RemoteError, UserId};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> PasswordAuthClient {
    PasswordAuthClient::new(AuthConfig::new(format!("{}/v1", server.uri()), "test-key"))
        .expect("auth client")
}

#[tokio::test]
async fn sign_in_returns_the_provider_uid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .and(query_param("key", "test-key"))
        .and(body_json(json!({
            "email": "ada@example.com",
            "password": "hunter22",
            "returnSecureToken": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "u1",
            "email": "ada@example.com",
            "idToken": "token-1",
            "refreshToken": "refresh-1",
            "expiresIn": "3600"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let user = client_for(&server)
        .sign_in(" ada@example.com ", "hunter22")
        .await
        .expect("signed in");

    assert_eq!(user.uid, UserId::parse("u1").expect("id"));
    assert_eq!(user.email.as_deref(), Some("ada@example.com"));
    assert_eq!(user.id_token, "token-1");
    assert_eq!(user.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn provider_rejections_are_surfaced_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signUp"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "EMAIL_EXISTS", "errors": [] }
        })))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .sign_up("ada@example.com", "hunter22")
        .await
        .expect_err("sign up should fail");

    assert!(matches!(error, RemoteError::AuthRejected { status: 400, .. }));
    assert_eq!(error.to_string(), "EMAIL_EXISTS");
}

#[tokio::test]
async fn unreadable_rejections_fall_back_to_the_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .sign_in("ada@example.com", "hunter22")
        .await
        .expect_err("sign in should fail");

    assert_eq!(
        error.to_string(),
        "authentication failed with status 502 Bad Gateway"
    );
}
