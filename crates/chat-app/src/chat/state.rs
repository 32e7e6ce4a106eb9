use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use echome_remote::{RemoteMessage, RemoteResult, SendMessageResponse, SessionId};
use tracing::{debug, info, warn};

use crate::chat::events::Effect;
use crate::chat::message::{
    CreatedAtSource, Generation, HydrationTarget, Identity, ListingTarget, Message, SendTarget,
    Session,
};
use crate::notify::{MESSAGES_LOAD_FAILED, Notification, SEND_FAILED, SESSIONS_LOAD_FAILED};

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingSend {
    target: SendTarget,
    started_at: DateTime<Utc>,
    /// A hydration of the session landed while the send was outstanding, so the
    /// hydrated list may already hold the exchange.
    rehydrated: bool,
}

/// Sidebar row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub id: SessionId,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub created_at_is_approximate: bool,
    pub message_count: usize,
    pub is_current: bool,
}

/// Render-ready copy of the state.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSnapshot {
    pub signed_in: bool,
    pub user_email: Option<String>,
    pub sessions: Vec<SessionView>,
    pub current_session: Option<SessionId>,
    pub messages: Vec<Message>,
    pub input: String,
    /// A send for the current session is outstanding.
    pub sending: bool,
    pub can_submit: bool,
    pub loading_sessions: bool,
    pub loading_messages: bool,
}

/// Client-side conversation state kept consistent with the remote store.
///
/// Every operation mutates the state and returns the effects the caller must run.
/// Responses come back through the `apply_*` methods together with the target they
/// were requested for; a response whose target is no longer the outstanding one is
/// dropped, which keeps superseded identities and sessions from leaking into the view.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    identity: Option<Identity>,
    identity_generation: Generation,
    listing: Option<ListingTarget>,
    sessions: Vec<Session>,
    current_session: Option<SessionId>,
    session_generation: Generation,
    hydration: Option<HydrationTarget>,
    messages: Vec<Message>,
    input: String,
    sends_in_flight: HashMap<SessionId, PendingSend>,
    next_send_id: u64,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn session(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| session.id == *session_id)
    }

    pub fn current_session(&self) -> Option<&SessionId> {
        self.current_session.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Returns true while a send for the current session is outstanding.
    pub fn is_sending(&self) -> bool {
        self.current_session
            .as_ref()
            .is_some_and(|session_id| self.sends_in_flight.contains_key(session_id))
    }

    pub fn is_loading_sessions(&self) -> bool {
        self.listing.is_some()
    }

    pub fn is_loading_messages(&self) -> bool {
        self.hydration.is_some()
    }

    /// Reacts to the identity provider reporting a (possibly absent) user.
    pub fn set_identity(&mut self, identity: Option<Identity>) -> Vec<Effect> {
        let same_user = match (&self.identity, &identity) {
            (None, None) => true,
            (Some(current), Some(next)) => current.uid == next.uid,
            _ => false,
        };
        if same_user {
            // Re-notification for the same user only refreshes profile details.
            if identity.is_some() {
                self.identity = identity;
            }
            return Vec::new();
        }

        let previous = self.identity.take().map(|identity| identity.uid);
        self.identity = identity;
        self.identity_generation = self.identity_generation.next();
        self.reset_conversation_state();
        info!(
            previous = ?previous.as_ref().map(|uid| uid.as_str()),
            current = ?self.identity.as_ref().map(|identity| identity.uid.as_str()),
            generation = self.identity_generation.0,
            "identity changed"
        );

        let Some(identity) = &self.identity else {
            return Vec::new();
        };
        let target = ListingTarget {
            user_id: identity.uid.clone(),
            identity_generation: self.identity_generation,
        };
        self.listing = Some(target.clone());
        vec![Effect::FetchSessions(target)]
    }

    /// Applies a session listing response.
    pub fn apply_sessions(
        &mut self,
        target: ListingTarget,
        result: RemoteResult<Vec<SessionId>>,
        fetched_at: DateTime<Utc>,
    ) -> Vec<Effect> {
        if self.listing.as_ref() != Some(&target) {
            debug!(
                user_id = %target.user_id,
                generation = target.identity_generation.0,
                "discarding stale session listing"
            );
            return Vec::new();
        }
        self.listing = None;

        let listed_ids = match result {
            Ok(listed_ids) => listed_ids,
            Err(error) => {
                warn!(user_id = %target.user_id, "failed to load sessions: {error}");
                return vec![Effect::Notify(Notification::error(SESSIONS_LOAD_FAILED))];
            }
        };

        let mut sessions = listed_ids
            .into_iter()
            .enumerate()
            .map(|(index, session_id)| Session::from_listing(session_id, index, fetched_at))
            .collect::<Vec<_>>();

        // Sessions started while the listing was in flight stay, keeping their cached counts.
        let listed = sessions
            .iter()
            .map(|session| session.id.clone())
            .collect::<HashSet<_>>();
        for existing in std::mem::take(&mut self.sessions) {
            if listed.contains(&existing.id) {
                if let Some(session) = sessions.iter_mut().find(|s| s.id == existing.id) {
                    session.message_count = session.message_count.max(existing.message_count);
                }
            } else {
                sessions.push(existing);
            }
        }
        self.sessions = sessions;
        info!(
            user_id = %target.user_id,
            session_count = self.sessions.len(),
            "session list hydrated"
        );

        if self.current_session.is_some() {
            return Vec::new();
        }
        // Resume the most recent conversation.
        match self.sessions.last().map(|session| session.id.clone()) {
            Some(session_id) => self.activate_session(session_id),
            None => Vec::new(),
        }
    }

    /// Makes another known session current and hydrates its messages.
    pub fn select_session(&mut self, session_id: &SessionId) -> Vec<Effect> {
        if self.identity.is_none() {
            debug!(session_id = %session_id, "ignoring session selection while signed out");
            return Vec::new();
        }
        if self.current_session.as_ref() == Some(session_id) {
            return Vec::new();
        }
        if self.session(session_id).is_none() {
            warn!(session_id = %session_id, "ignoring selection of unknown session");
            return Vec::new();
        }

        self.activate_session(session_id.clone())
    }

    /// Fetches the current session's messages again, keeping the visible list until it lands.
    pub fn reload_messages(&mut self) -> Vec<Effect> {
        if self.current_session.is_none() {
            return Vec::new();
        }
        self.session_generation = self.session_generation.next();
        self.hydrate_current()
    }

    /// Applies a message hydration response.
    pub fn apply_messages(
        &mut self,
        target: HydrationTarget,
        result: RemoteResult<Vec<RemoteMessage>>,
    ) -> Vec<Effect> {
        if self.hydration.as_ref() != Some(&target) {
            debug!(
                session_id = %target.session_id,
                generation = target.session_generation.0,
                "discarding stale message hydration"
            );
            return Vec::new();
        }
        self.hydration = None;

        match result {
            Ok(remote_messages) => {
                self.messages = remote_messages.into_iter().map(Message::from).collect();
                let message_count = self.messages.len();
                if let Some(session) = self.session_mut(&target.session_id) {
                    session.message_count = message_count;
                }
                if let Some(pending) = self.sends_in_flight.get_mut(&target.session_id) {
                    pending.rehydrated = true;
                }
                self.ensure_pending_tail();
                debug!(session_id = %target.session_id, message_count, "messages hydrated");
                Vec::new()
            }
            Err(error) => {
                // The list stays as it was: empty after a switch, stale after a reload.
                warn!(session_id = %target.session_id, "failed to load chat: {error}");
                vec![Effect::Notify(Notification::error(MESSAGES_LOAD_FAILED))]
            }
        }
    }

    /// Starts a new empty conversation locally. The store learns about it on the first send.
    pub fn create_session(&mut self, now: DateTime<Utc>) -> Option<SessionId> {
        self.identity.as_ref()?;

        let session_id = self.unique_session_id(now);
        let ordinal = self.sessions.len() + 1;
        self.sessions
            .push(Session::local(session_id.clone(), ordinal, now));
        self.session_generation = self.session_generation.next();
        self.current_session = Some(session_id.clone());
        self.messages.clear();
        self.hydration = None;
        info!(session_id = %session_id, "created local session");
        Some(session_id)
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Sends the current input, showing a placeholder until the reply arrives.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            debug!("ignoring empty submission");
            return Vec::new();
        }
        let Some(user_id) = self.identity.as_ref().map(|identity| identity.uid.clone()) else {
            debug!("ignoring submission while signed out");
            return Vec::new();
        };
        if self.is_sending() {
            debug!("ignoring submission while a reply is outstanding");
            return Vec::new();
        }

        let session_id = match self.current_session.clone() {
            Some(session_id) => session_id,
            None => match self.create_session(now) {
                Some(session_id) => session_id,
                None => return Vec::new(),
            },
        };

        self.next_send_id += 1;
        let target = SendTarget {
            user_id,
            session_id: session_id.clone(),
            identity_generation: self.identity_generation,
            send_id: self.next_send_id,
        };
        self.sends_in_flight.insert(
            session_id,
            PendingSend {
                target: target.clone(),
                started_at: now,
                rehydrated: false,
            },
        );
        self.messages.push(Message::pending(now));
        debug!(session_id = %target.session_id, send_id = target.send_id, "send started");

        vec![Effect::SendMessage { target, text }]
    }

    /// Resolves a send: swaps the placeholder for the confirmed pair, or rolls it back.
    pub fn apply_send_result(
        &mut self,
        target: SendTarget,
        text: String,
        result: RemoteResult<SendMessageResponse>,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        let tracked = self
            .sends_in_flight
            .get(&target.session_id)
            .is_some_and(|pending| pending.target == target);
        if !tracked || target.identity_generation != self.identity_generation {
            debug!(
                session_id = %target.session_id,
                send_id = target.send_id,
                "discarding stale send result"
            );
            return Vec::new();
        }
        let Some(pending) = self.sends_in_flight.remove(&target.session_id) else {
            return Vec::new();
        };

        let is_current = self.current_session.as_ref() == Some(&target.session_id);
        if is_current {
            self.remove_pending_placeholder();
        }

        match result {
            Ok(response) => {
                if self.input.trim() == text {
                    self.input.clear();
                }
                info!(session_id = %target.session_id, send_id = target.send_id, "reply received");

                if pending.rehydrated {
                    // The hydrated list may already hold this exchange, so refetch instead.
                    debug!(session_id = %target.session_id, "refetching messages after send");
                    if !is_current {
                        return Vec::new();
                    }
                    self.session_generation = self.session_generation.next();
                    return self.hydrate_current();
                }

                if let Some(session) = self.session_mut(&target.session_id) {
                    session.message_count += 1;
                }
                if is_current {
                    self.messages.push(Message::resolved(
                        text,
                        response.reply,
                        response.entry,
                        now,
                    ));
                }
                Vec::new()
            }
            Err(error) => {
                warn!(
                    session_id = %target.session_id,
                    send_id = target.send_id,
                    "failed to get reply: {error}"
                );
                vec![Effect::Notify(Notification::error(SEND_FAILED))]
            }
        }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        let sending = self.is_sending();
        let signed_in = self.identity.is_some();
        ChatSnapshot {
            signed_in,
            user_email: self
                .identity
                .as_ref()
                .and_then(|identity| identity.email.clone()),
            sessions: self
                .sessions
                .iter()
                .map(|session| SessionView {
                    id: session.id.clone(),
                    display_name: session.display_name.clone(),
                    created_at: session.created_at,
                    created_at_is_approximate: session.created_at_source
                        == CreatedAtSource::FetchTime,
                    message_count: session.message_count,
                    is_current: self.current_session.as_ref() == Some(&session.id),
                })
                .collect(),
            current_session: self.current_session.clone(),
            messages: self.messages.clone(),
            input: self.input.clone(),
            sending,
            can_submit: signed_in && !sending && !self.input.trim().is_empty(),
            loading_sessions: self.is_loading_sessions(),
            loading_messages: self.is_loading_messages(),
        }
    }

    fn reset_conversation_state(&mut self) {
        self.listing = None;
        self.sessions.clear();
        self.current_session = None;
        self.session_generation = self.session_generation.next();
        self.hydration = None;
        self.messages.clear();
        self.input.clear();
        self.sends_in_flight.clear();
    }

    fn activate_session(&mut self, session_id: SessionId) -> Vec<Effect> {
        debug!(session_id = %session_id, "activating session");
        self.session_generation = self.session_generation.next();
        self.current_session = Some(session_id);
        self.messages.clear();
        self.hydrate_current()
    }

    fn hydrate_current(&mut self) -> Vec<Effect> {
        let (Some(identity), Some(session_id)) = (&self.identity, &self.current_session) else {
            return Vec::new();
        };

        // A local session that never held a message has nothing remote to fetch.
        let needs_fetch = self
            .session(session_id)
            .is_some_and(|session| !session.is_unsent_local());
        if !needs_fetch {
            self.hydration = None;
            self.ensure_pending_tail();
            return Vec::new();
        }

        let target = HydrationTarget {
            user_id: identity.uid.clone(),
            session_id: session_id.clone(),
            identity_generation: self.identity_generation,
            session_generation: self.session_generation,
        };
        self.hydration = Some(target.clone());
        self.ensure_pending_tail();
        vec![Effect::FetchMessages(target)]
    }

    fn ensure_pending_tail(&mut self) {
        let Some(session_id) = &self.current_session else {
            return;
        };
        let Some(pending) = self.sends_in_flight.get(session_id) else {
            return;
        };
        if !self.messages.last().is_some_and(Message::is_pending) {
            self.messages.push(Message::pending(pending.started_at));
        }
    }

    fn remove_pending_placeholder(&mut self) {
        if let Some(index) = self.messages.iter().rposition(Message::is_pending) {
            self.messages.remove(index);
        }
    }

    fn session_mut(&mut self, session_id: &SessionId) -> Option<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|session| session.id == *session_id)
    }

    fn unique_session_id(&self, now: DateTime<Utc>) -> SessionId {
        let mut millis = now.timestamp_millis();
        loop {
            let candidate = SessionId::from_unix_millis(millis);
            if self.session(&candidate).is_none() {
                return candidate;
            }
            millis += 1;
        }
    }
}
