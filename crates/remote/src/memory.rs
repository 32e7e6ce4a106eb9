use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::RwLock;

use super::error::RemoteResult;
use super::ids::{SessionId, UserId};
use super::types::{RemoteMessage, SendMessageRequest, SendMessageResponse};
use super::ConversationStore;

/// Produces the assistant reply for one posted message.
pub type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Debug, Clone)]
struct StoredSession {
    id: SessionId,
    messages: Vec<RemoteMessage>,
}

/// In-process [`ConversationStore`] with the same contract as the HTTP backend.
pub struct MemoryConversationStore {
    users: RwLock<HashMap<UserId, Vec<StoredSession>>>,
    responder: Responder,
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConversationStore {
    /// Creates an empty store that echoes every message back.
    pub fn new() -> Self {
        Self::with_responder(Arc::new(|message: &str| format!("You said: {message}")))
    }

    pub fn with_responder(responder: Responder) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            responder,
        }
    }

    /// Seeds a session with existing exchanges, replacing any earlier content for it.
    pub async fn insert_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
        messages: Vec<RemoteMessage>,
    ) {
        let mut users = self.users.write().await;
        let sessions = users.entry(user_id).or_default();
        match sessions.iter_mut().find(|session| session.id == session_id) {
            Some(existing) => existing.messages = messages,
            None => sessions.push(StoredSession {
                id: session_id,
                messages,
            }),
        }
    }

    pub async fn messages(&self, user_id: &UserId, session_id: &SessionId) -> Vec<RemoteMessage> {
        let users = self.users.read().await;
        users
            .get(user_id)
            .and_then(|sessions| sessions.iter().find(|session| session.id == *session_id))
            .map(|session| session.messages.clone())
            .unwrap_or_default()
    }
}

impl ConversationStore for MemoryConversationStore {
    fn list_sessions<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, RemoteResult<Vec<SessionId>>> {
        async move {
            let users = self.users.read().await;
            Ok(users
                .get(user_id)
                .map(|sessions| sessions.iter().map(|session| session.id.clone()).collect())
                .unwrap_or_default())
        }
        .boxed()
    }

    fn list_messages<'a>(
        &'a self,
        user_id: &'a UserId,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, RemoteResult<Vec<RemoteMessage>>> {
        async move { Ok(self.messages(user_id, session_id).await) }.boxed()
    }

    fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> BoxFuture<'_, RemoteResult<SendMessageResponse>> {
        async move {
            let reply = (self.responder)(&request.message);
            let stored = RemoteMessage {
                message: request.message,
                ai_response: reply.clone(),
                date: Some(Value::String(Utc::now().to_rfc3339())),
                summary: None,
                emotions: None,
            };

            let mut users = self.users.write().await;
            let sessions = users.entry(request.user_id).or_default();
            match sessions
                .iter_mut()
                .find(|session| session.id == request.session_id)
            {
                Some(session) => session.messages.push(stored),
                None => {
                    tracing::debug!(
                        session_id = %request.session_id,
                        "creating session on first message"
                    );
                    sessions.push(StoredSession {
                        id: request.session_id,
                        messages: vec![stored],
                    });
                }
            }

            Ok(SendMessageResponse { reply, entry: None })
        }
        .boxed()
    }
}
