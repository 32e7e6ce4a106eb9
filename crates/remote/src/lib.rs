pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod ids;
pub mod memory;
pub mod types;

use futures::future::BoxFuture;

pub use auth::{
    AuthConfig, AuthenticatedUser, DEFAULT_IDENTITY_ENDPOINT, PasswordAuthClient,
};
pub use config::{DEFAULT_REQUEST_TIMEOUT, RemoteConfig, RetryPolicy};
pub use error::{RemoteError, RemoteResult};
pub use http::HttpConversationStore;
pub use ids::{SessionId, UserId};
pub use memory::{MemoryConversationStore, Responder};
pub use types::{
    DEFAULT_SERVER_ERROR, MessageKind, RemoteMessage, ReplyEntry, SendMessageRequest,
    SendMessageResponse, parse_remote_timestamp,
};

/// The remote conversation store, reachable only through request/response.
pub trait ConversationStore: Send + Sync {
    /// Session identifiers for one user, in creation order.
    fn list_sessions<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, RemoteResult<Vec<SessionId>>>;

    /// Ordered exchanges stored under one session.
    fn list_messages<'a>(
        &'a self,
        user_id: &'a UserId,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, RemoteResult<Vec<RemoteMessage>>>;

    /// Posts one message and waits for the reply.
    ///
    /// The store creates the session on the first message it receives for an unknown id.
    fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> BoxFuture<'_, RemoteResult<SendMessageResponse>>;
}
