use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use echome::chat::{Identity, Synchronizer};
use echome::notify::{Notification, RecordingNotifier, SEND_FAILED};
use echome_remote::{
    ConversationStore, MemoryConversationStore, RemoteError, RemoteMessage, RemoteResult,
    SendMessageRequest, SendMessageResponse, SessionId, UserId,
};
use futures::FutureExt;
use futures::future::BoxFuture;

const SLOW: Duration = Duration::from_millis(200);

fn user(raw: &str) -> UserId {
    UserId::parse(raw).expect("user id")
}

fn session(raw: &str) -> SessionId {
    SessionId::parse(raw).expect("session id")
}

fn exchange(message: &str, reply: &str) -> RemoteMessage {
    RemoteMessage {
        message: message.to_string(),
        ai_response: reply.to_string(),
        ..RemoteMessage::default()
    }
}

/// Memory store with configurable latency and send failures.
#[derive(Default)]
struct ScriptedStore {
    inner: MemoryConversationStore,
    slow_listings: HashSet<UserId>,
    slow_sessions: HashSet<SessionId>,
    fail_sends: bool,
}

impl ScriptedStore {
    async fn pause_if(slow: bool) {
        if slow {
            tokio::time::sleep(SLOW).await;
        }
    }
}

impl ConversationStore for ScriptedStore {
    fn list_sessions<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, RemoteResult<Vec<SessionId>>> {
        async move {
            Self::pause_if(self.slow_listings.contains(user_id)).await;
            self.inner.list_sessions(user_id).await
        }
        .boxed()
    }

    fn list_messages<'a>(
        &'a self,
        user_id: &'a UserId,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, RemoteResult<Vec<RemoteMessage>>> {
        async move {
            Self::pause_if(self.slow_sessions.contains(session_id)).await;
            self.inner.list_messages(user_id, session_id).await
        }
        .boxed()
    }

    fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> BoxFuture<'_, RemoteResult<SendMessageResponse>> {
        async move {
            if self.fail_sends {
                return Err(RemoteError::Status {
                    stage: "scripted-send",
                    url: "memory://api/message".to_string(),
                    status: 500,
                    message: "Server error".to_string(),
                });
            }
            self.inner.send_message(request).await
        }
        .boxed()
    }
}

async fn seeded_store() -> ScriptedStore {
    let store = ScriptedStore::default();
    store
        .inner
        .insert_session(
            user("u1"),
            session("1700000000000"),
            vec![exchange("hi", "hello")],
        )
        .await;
    store
}

fn synchronizer(
    store: ScriptedStore,
) -> (Synchronizer, Arc<ScriptedStore>, Arc<RecordingNotifier>) {
    let store = Arc::new(store);
    let notifications = Arc::new(RecordingNotifier::new());
    let sync = Synchronizer::new(store.clone(), notifications.clone());
    (sync, store, notifications)
}

#[tokio::test]
async fn sign_in_hydrates_and_a_send_round_trips() {
    let (mut sync, store, notifications) = synchronizer(seeded_store().await);

    sync.set_identity(Some(Identity::new(user("u1"))));
    sync.settle().await;

    let snapshot = sync.snapshot();
    assert_eq!(snapshot.sessions.len(), 1);
    assert_eq!(snapshot.sessions[0].display_name, "Chat 1");
    assert_eq!(snapshot.sessions[0].message_count, 1);
    assert_eq!(snapshot.current_session, Some(session("1700000000000")));
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].ai_text, "hello");

    sync.set_input("bye");
    sync.submit();
    let sending = sync.snapshot();
    assert!(sending.sending);
    assert_eq!(sending.messages.len(), 2);
    assert!(sending.messages[1].is_pending());

    sync.settle().await;

    let snapshot = sync.snapshot();
    assert!(!snapshot.sending);
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[1].user_text, "bye");
    assert_eq!(snapshot.messages[1].ai_text, "You said: bye");
    assert_eq!(snapshot.sessions[0].message_count, 2);
    assert_eq!(snapshot.input, "");
    assert_eq!(
        store
            .inner
            .messages(&user("u1"), &session("1700000000000"))
            .await
            .len(),
        2
    );
    assert!(notifications.take().is_empty());
}

#[tokio::test]
async fn failed_send_restores_the_list_and_keeps_the_draft() {
    let mut store = seeded_store().await;
    store.fail_sends = true;
    let (mut sync, _store, notifications) = synchronizer(store);
    sync.set_identity(Some(Identity::new(user("u1"))));
    sync.settle().await;

    sync.set_input("bye");
    sync.submit();
    sync.settle().await;

    let snapshot = sync.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.input, "bye");
    assert!(snapshot.can_submit);
    assert_eq!(notifications.take(), vec![Notification::error(SEND_FAILED)]);
}

#[tokio::test]
async fn slow_hydration_of_an_abandoned_session_is_ignored() {
    let mut store = seeded_store().await;
    store
        .inner
        .insert_session(user("u1"), session("b"), vec![exchange("in b", "reply b")])
        .await;
    store
        .inner
        .insert_session(user("u1"), session("a"), vec![exchange("in a", "reply a")])
        .await;
    store.slow_sessions.insert(session("a"));
    let (mut sync, _store, _notifications) = synchronizer(store);

    sync.set_identity(Some(Identity::new(user("u1"))));
    // Listing lands and starts the slow hydration of the last session, `a`.
    assert!(sync.next_completion().await);
    assert_eq!(sync.state().current_session(), Some(&session("a")));

    sync.select_session(&session("b"));
    sync.settle().await;

    let snapshot = sync.snapshot();
    assert_eq!(snapshot.current_session, Some(session("b")));
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].user_text, "in b");
}

#[tokio::test]
async fn listing_for_a_previous_user_never_shows() {
    let mut store = seeded_store().await;
    store
        .inner
        .insert_session(user("u2"), session("u2-chat"), Vec::new())
        .await;
    store.slow_listings.insert(user("u1"));
    let (mut sync, _store, _notifications) = synchronizer(store);

    sync.set_identity(Some(Identity::new(user("u1"))));
    sync.set_identity(Some(Identity::new(user("u2"))));
    sync.settle().await;

    let snapshot = sync.snapshot();
    assert_eq!(snapshot.sessions.len(), 1);
    assert_eq!(snapshot.sessions[0].id, session("u2-chat"));
    assert!(snapshot.messages.is_empty());
}

#[tokio::test]
async fn rapid_double_submit_sends_once() {
    let (mut sync, store, _notifications) = synchronizer(seeded_store().await);
    sync.set_identity(Some(Identity::new(user("u1"))));
    sync.settle().await;

    sync.set_input("bye");
    sync.submit();
    sync.submit();
    sync.settle().await;

    assert_eq!(
        store
            .inner
            .messages(&user("u1"), &session("1700000000000"))
            .await
            .len(),
        2
    );
    assert_eq!(sync.snapshot().messages.len(), 2);
}

#[tokio::test]
async fn new_session_reaches_the_store_with_its_first_message() {
    let (mut sync, store, _notifications) = synchronizer(seeded_store().await);
    sync.set_identity(Some(Identity::new(user("u1"))));
    sync.settle().await;

    let created = sync.create_session().expect("signed in");
    let snapshot = sync.snapshot();
    assert_eq!(snapshot.sessions.len(), 2);
    assert_eq!(snapshot.sessions[1].display_name, "Chat 2");
    assert!(snapshot.messages.is_empty());
    assert!(!sync.has_pending_requests());
    assert!(
        !store
            .inner
            .list_sessions(&user("u1"))
            .await
            .expect("list")
            .contains(&created)
    );

    sync.set_input("first");
    sync.submit();
    sync.settle().await;

    assert!(
        store
            .inner
            .list_sessions(&user("u1"))
            .await
            .expect("list")
            .contains(&created)
    );
    assert_eq!(sync.snapshot().sessions[1].message_count, 1);
}

#[tokio::test]
async fn sign_out_drops_an_outstanding_reply() {
    let (mut sync, store, notifications) = synchronizer(seeded_store().await);
    sync.set_identity(Some(Identity::new(user("u1"))));
    sync.settle().await;

    sync.set_input("bye");
    sync.submit();
    sync.set_identity(None);
    sync.settle().await;

    let snapshot = sync.snapshot();
    assert!(!snapshot.signed_in);
    assert!(snapshot.messages.is_empty());
    assert!(snapshot.sessions.is_empty());
    assert!(notifications.take().is_empty());
    // The request itself was not cancelled.
    assert_eq!(
        store
            .inner
            .messages(&user("u1"), &session("1700000000000"))
            .await
            .len(),
        2
    );
}

#[tokio::test]
async fn drain_ready_applies_only_what_already_arrived() {
    let mut store = seeded_store().await;
    store.slow_sessions.insert(session("1700000000000"));
    let (mut sync, _store, _notifications) = synchronizer(store);
    assert_eq!(sync.drain_ready(), 0);

    sync.set_identity(Some(Identity::new(user("u1"))));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The listing is in; the hydration it started is still sleeping.
    assert_eq!(sync.drain_ready(), 1);
    assert_eq!(sync.snapshot().sessions.len(), 1);
    assert!(sync.snapshot().loading_messages);
    assert!(sync.has_pending_requests());
    assert_eq!(sync.drain_ready(), 0);

    sync.settle().await;
    assert!(!sync.has_pending_requests());
    assert_eq!(sync.snapshot().messages.len(), 1);
}
