use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{SessionId, UserId};

/// Message used when a failed response carries no readable `error` field.
pub const DEFAULT_SERVER_ERROR: &str = "Server error";

/// Discriminator telling the backend which kind of entry a posted message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
}

/// One stored exchange as returned by the conversation listing endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMessage {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub ai_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotions: Option<Value>,
}

impl RemoteMessage {
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.date.as_ref().and_then(parse_remote_timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl SendMessageRequest {
    pub fn chat(user_id: UserId, session_id: SessionId, message: impl Into<String>) -> Self {
        Self {
            user_id,
            session_id,
            message: message.into(),
            kind: MessageKind::Chat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReplyEntry {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub emotions: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub reply: String,
    #[serde(default)]
    pub entry: Option<ReplyEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(default)]
    pub error: Option<String>,
}

/// Extracts the server's `error` text from a failed response body.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .and_then(|payload| payload.error)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| DEFAULT_SERVER_ERROR.to_string())
}

/// Reads the timestamp shapes the backend is known to emit.
///
/// Accepts RFC 3339 strings, epoch milliseconds (number or numeric string) and
/// Firestore-style `{ _seconds, _nanoseconds }` objects.
pub fn parse_remote_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                return Some(parsed.with_timezone(&Utc));
            }
            raw.parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis)
        }
        Value::Number(number) => number.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(fields) => {
            let seconds = fields
                .get("_seconds")
                .or_else(|| fields.get("seconds"))
                .and_then(Value::as_i64)?;
            let nanos = fields
                .get("_nanoseconds")
                .or_else(|| fields.get("nanoseconds"))
                .and_then(Value::as_u64)
                .and_then(|nanos| u32::try_from(nanos).ok())
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, nanos)
        }
        _ => None,
    }
}
