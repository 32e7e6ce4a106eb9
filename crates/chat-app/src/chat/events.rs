use echome_remote::{RemoteMessage, RemoteResult, SendMessageResponse, SessionId};

use crate::chat::message::{HydrationTarget, ListingTarget, SendTarget};
use crate::notify::Notification;

/// Side effect requested by a state transition.
///
/// The reducer never performs I/O; the synchronizer executes these.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchSessions(ListingTarget),
    FetchMessages(HydrationTarget),
    SendMessage { target: SendTarget, text: String },
    Notify(Notification),
}

/// Result of a request, routed back to the state with the target it was issued for.
#[derive(Debug)]
pub enum Completion {
    SessionsLoaded {
        target: ListingTarget,
        result: RemoteResult<Vec<SessionId>>,
    },
    MessagesLoaded {
        target: HydrationTarget,
        result: RemoteResult<Vec<RemoteMessage>>,
    },
    SendFinished {
        target: SendTarget,
        text: String,
        result: RemoteResult<SendMessageResponse>,
    },
}

impl Completion {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionsLoaded { .. } => "sessions-loaded",
            Self::MessagesLoaded { .. } => "messages-loaded",
            Self::SendFinished { .. } => "send-finished",
        }
    }
}
