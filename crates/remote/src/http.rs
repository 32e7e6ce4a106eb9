use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Url;
use serde::de::DeserializeOwned;
use snafu::ResultExt;

use super::config::RemoteConfig;
use super::error::{
    BuildHttpClientSnafu, DecodePayloadSnafu, InvalidBaseUrlSnafu, RemoteError, RemoteResult,
    RequestSnafu, StatusSnafu,
};
use super::ids::{SessionId, UserId};
use super::types::{RemoteMessage, SendMessageRequest, SendMessageResponse, error_message};
use super::ConversationStore;

/// [`ConversationStore`] backed by the chat backend's REST API.
#[derive(Debug, Clone)]
pub struct HttpConversationStore {
    http: reqwest::Client,
    base_url: Url,
    config: RemoteConfig,
}

impl HttpConversationStore {
    pub fn new(config: RemoteConfig) -> RemoteResult<Self> {
        let base_url = parse_base_url(&config.base_url, "http-store-parse-base-url")?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context(BuildHttpClientSnafu {
                stage: "http-store-build-client",
            })?;

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // The base URL was checked to be hierarchical, so segment access cannot fail here.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        stage: &'static str,
    ) -> RemoteResult<T> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.get_json_once(&url, stage).await {
                Ok(payload) => return Ok(payload),
                Err(error) if error.is_retryable() && self.config.retry.should_retry(attempts) => {
                    let delay = self.config.retry.delay_for_attempt(attempts - 1);
                    tracing::warn!(
                        %url,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        "remote request failed, retrying: {error}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        url: &Url,
        stage: &'static str,
    ) -> RemoteResult<T> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .context(RequestSnafu {
                stage,
                url: url.as_str(),
            })?;
        decode_response(response, url, stage).await
    }

    async fn fetch_sessions(&self, user_id: &UserId) -> RemoteResult<Vec<SessionId>> {
        let url = self.endpoint(&["api", "sessions", user_id.as_str()]);
        let raw_ids: Vec<String> = self.get_json(url, "list-sessions").await?;
        let listed = raw_ids.len();

        let sessions = raw_ids
            .iter()
            .filter_map(|raw| SessionId::parse(raw).ok())
            .collect::<Vec<_>>();
        if sessions.len() != listed {
            tracing::warn!(
                user_id = %user_id,
                skipped = listed - sessions.len(),
                "session listing contained blank identifiers"
            );
        }

        tracing::debug!(user_id = %user_id, session_count = sessions.len(), "listed sessions");
        Ok(sessions)
    }

    async fn fetch_messages(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> RemoteResult<Vec<RemoteMessage>> {
        let url = self.endpoint(&["api", "chats", user_id.as_str(), session_id.as_str()]);
        let messages: Vec<RemoteMessage> = self.get_json(url, "list-messages").await?;
        tracing::debug!(
            user_id = %user_id,
            session_id = %session_id,
            message_count = messages.len(),
            "listed messages"
        );
        Ok(messages)
    }

    // Posting is not idempotent, so a failure is reported after a single attempt.
    async fn post_message(&self, request: SendMessageRequest) -> RemoteResult<SendMessageResponse> {
        let url = self.endpoint(&["api", "message"]);
        let response = self
            .http
            .post(url.clone())
            .json(&request)
            .send()
            .await
            .context(RequestSnafu {
                stage: "send-message",
                url: url.as_str(),
            })?;
        let reply: SendMessageResponse = decode_response(response, &url, "send-message").await?;
        tracing::debug!(
            user_id = %request.user_id,
            session_id = %request.session_id,
            reply_len = reply.reply.len(),
            "message accepted"
        );
        Ok(reply)
    }
}

impl ConversationStore for HttpConversationStore {
    fn list_sessions<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, RemoteResult<Vec<SessionId>>> {
        self.fetch_sessions(user_id).boxed()
    }

    fn list_messages<'a>(
        &'a self,
        user_id: &'a UserId,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, RemoteResult<Vec<RemoteMessage>>> {
        self.fetch_messages(user_id, session_id).boxed()
    }

    fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> BoxFuture<'_, RemoteResult<SendMessageResponse>> {
        self.post_message(request).boxed()
    }
}

pub(crate) fn parse_base_url(raw: &str, stage: &'static str) -> RemoteResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|source| RemoteError::InvalidBaseUrl {
        stage,
        raw: raw.to_string(),
        details: source.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return InvalidBaseUrlSnafu {
            stage,
            raw,
            details: "URL cannot carry path segments",
        }
        .fail();
    }

    Ok(url)
}

pub(crate) async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
    url: &Url,
    stage: &'static str,
) -> RemoteResult<T> {
    let status = response.status();
    let body = response.text().await.context(RequestSnafu {
        stage,
        url: url.as_str(),
    })?;

    if !status.is_success() {
        return StatusSnafu {
            stage,
            url: url.as_str(),
            status: status.as_u16(),
            message: error_message(&body),
        }
        .fail();
    }

    serde_json::from_str(&body).context(DecodePayloadSnafu {
        stage,
        url: url.as_str(),
    })
}
