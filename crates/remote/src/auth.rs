//! Email/password sign-in against an identity-toolkit style REST endpoint.

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use super::config::DEFAULT_REQUEST_TIMEOUT;
use super::error::{
    BuildHttpClientSnafu, DecodePayloadSnafu, MissingApiKeySnafu, MissingCredentialsSnafu,
    RemoteError, RemoteResult, RequestSnafu,
};
use super::http::parse_base_url;
use super::ids::UserId;

pub const DEFAULT_IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";

const SIGN_IN_ACTION: &str = "accounts:signInWithPassword";
const SIGN_UP_ACTION: &str = "accounts:signUp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub endpoint: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl AuthConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub uid: UserId,
    pub email: Option<String>,
    pub id_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordAuthRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordAuthResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorEnvelope {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: String,
}

pub struct PasswordAuthClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl PasswordAuthClient {
    pub fn new(config: AuthConfig) -> RemoteResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "auth-client-new",
            }
        );

        let endpoint = parse_base_url(&config.endpoint, "auth-client-parse-endpoint")?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context(BuildHttpClientSnafu {
                stage: "auth-client-build",
            })?;

        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key,
        })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<AuthenticatedUser> {
        self.exchange(SIGN_IN_ACTION, email, password).await
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> RemoteResult<AuthenticatedUser> {
        self.exchange(SIGN_UP_ACTION, email, password).await
    }

    fn action_url(&self, action: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(action);
        }
        url.query_pairs_mut().append_pair("key", &self.api_key);
        url
    }

    async fn exchange(
        &self,
        action: &'static str,
        email: &str,
        password: &str,
    ) -> RemoteResult<AuthenticatedUser> {
        let email = email.trim();
        ensure!(
            !email.is_empty() && !password.is_empty(),
            MissingCredentialsSnafu { stage: action }
        );

        let url = self.action_url(action);
        // The query carries the API key, so only the path is logged.
        let log_url = url.path().to_string();
        let response = self
            .http
            .post(url)
            .json(&PasswordAuthRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .context(RequestSnafu {
                stage: action,
                url: log_url.as_str(),
            })?;

        let status = response.status();
        let body = response.text().await.context(RequestSnafu {
            stage: action,
            url: log_url.as_str(),
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ProviderErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .ok()
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| format!("authentication failed with status {status}"));
            tracing::warn!(
                action,
                status = status.as_u16(),
                "identity provider rejected credentials"
            );
            return Err(RemoteError::AuthRejected {
                stage: action,
                status: status.as_u16(),
                message,
            });
        }

        let payload: PasswordAuthResponse =
            serde_json::from_str(&body).context(DecodePayloadSnafu {
                stage: action,
                url: log_url.as_str(),
            })?;
        let uid = UserId::parse(&payload.local_id)?;
        tracing::info!(action, uid = %uid, "identity provider accepted credentials");

        Ok(AuthenticatedUser {
            uid,
            email: payload.email,
            id_token: payload.id_token,
            refresh_token: payload.refresh_token,
        })
    }
}
