use chrono::{DateTime, Utc};
use echome_remote::{RemoteMessage, ReplyEntry, SessionId, UserId};
use serde_json::Value;

/// Assistant text shown while a reply is outstanding.
pub const PENDING_REPLY_SENTINEL: &str = "typing...";
/// Listed identifiers starting with this prefix are already display names.
pub const NAMED_SESSION_PREFIX: &str = "Chat";

/// Authenticated user as observed from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: UserId,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(uid: UserId) -> Self {
        Self { uid, email: None }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Where a session descriptor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOrigin {
    /// Materialized from the remote listing.
    Remote,
    /// Created on this client; the store has it only once a message was sent.
    Local,
}

/// How trustworthy `Session::created_at` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreatedAtSource {
    /// Decoded from a timestamp-shaped identifier.
    Identifier,
    /// Approximation: the identifier encodes no time, so the listing fetch time is used.
    FetchTime,
    /// Stamped when the session was created locally.
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub created_at_source: CreatedAtSource,
    /// Cached count; may lag the store until the session is hydrated again.
    pub message_count: usize,
    pub origin: SessionOrigin,
}

impl Session {
    /// Builds a descriptor for the entry at `index` of a remote listing.
    pub fn from_listing(id: SessionId, index: usize, fetched_at: DateTime<Utc>) -> Self {
        let display_name = if id.as_str().starts_with(NAMED_SESSION_PREFIX) {
            id.as_str().to_string()
        } else {
            default_session_name(index + 1)
        };

        let (created_at, created_at_source) = match id
            .unix_millis()
            .and_then(DateTime::from_timestamp_millis)
        {
            Some(created_at) => (created_at, CreatedAtSource::Identifier),
            None => (fetched_at, CreatedAtSource::FetchTime),
        };

        Self {
            id,
            display_name,
            created_at,
            created_at_source,
            message_count: 0,
            origin: SessionOrigin::Remote,
        }
    }

    /// Builds a descriptor for a session started on this client.
    pub fn local(id: SessionId, ordinal: usize, now: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: default_session_name(ordinal),
            created_at: now,
            created_at_source: CreatedAtSource::Local,
            message_count: 0,
            origin: SessionOrigin::Local,
        }
    }

    /// Returns true when the store cannot hold anything for this session yet.
    pub fn is_unsent_local(&self) -> bool {
        self.origin == SessionOrigin::Local && self.message_count == 0
    }
}

pub fn default_session_name(ordinal: usize) -> String {
    format!("{NAMED_SESSION_PREFIX} {ordinal}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    /// Local placeholder for a send that has not resolved.
    Pending,
    Done,
}

/// One user/assistant exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub user_text: String,
    pub ai_text: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub emotions: Option<Value>,
    pub status: MessageStatus,
}

impl Message {
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            user_text: String::new(),
            ai_text: PENDING_REPLY_SENTINEL.to_string(),
            sent_at: Some(now),
            summary: None,
            emotions: None,
            status: MessageStatus::Pending,
        }
    }

    /// The confirmed pair produced by a successful send.
    pub fn resolved(
        user_text: impl Into<String>,
        reply: impl Into<String>,
        entry: Option<ReplyEntry>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        let entry = entry.unwrap_or_default();
        Self {
            user_text: user_text.into(),
            ai_text: reply.into(),
            sent_at: Some(sent_at),
            summary: entry.summary,
            emotions: entry.emotions,
            status: MessageStatus::Done,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }
}

impl From<RemoteMessage> for Message {
    fn from(remote: RemoteMessage) -> Self {
        let sent_at = remote.sent_at();
        Self {
            user_text: remote.message,
            ai_text: remote.ai_response,
            sent_at,
            summary: remote.summary,
            emotions: remote.emotions,
            status: MessageStatus::Done,
        }
    }
}

/// Monotonic counter stamped on requests so superseded responses can be recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Routing key for a session listing request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingTarget {
    pub user_id: UserId,
    pub identity_generation: Generation,
}

/// Routing key for a message hydration request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HydrationTarget {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub identity_generation: Generation,
    pub session_generation: Generation,
}

/// Routing key for one send.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SendTarget {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub identity_generation: Generation,
    pub send_id: u64,
}
