use std::sync::Mutex;

pub const SESSIONS_LOAD_FAILED: &str = "Failed to load sessions.";
pub const MESSAGES_LOAD_FAILED: &str = "Failed to load chat.";
pub const SEND_FAILED: &str = "Failed to get reply. Try again.";
pub const NOTHING_TO_EXPORT: &str = "No messages to export.";
pub const LOGGED_OUT: &str = "Logged out successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// Toast-style notice for the user. Nothing tracks whether it was seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sink that queues notifications until the front end takes them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Notification> {
        match self.received.lock() {
            Ok(mut received) => std::mem::take(&mut *received),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        tracing::debug!(
            level = ?notification.level,
            text = %notification.message,
            "notification queued"
        );
        match self.received.lock() {
            Ok(mut received) => received.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
