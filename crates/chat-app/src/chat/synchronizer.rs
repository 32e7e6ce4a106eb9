use std::sync::Arc;

use chrono::Utc;
use echome_remote::{ConversationStore, SendMessageRequest, SessionId};
use tokio::sync::mpsc;

use crate::chat::events::{Completion, Effect};
use crate::chat::message::Identity;
use crate::chat::state::{ChatSnapshot, ChatState};
use crate::notify::{Notification, NotificationSink};

/// Drives a [`ChatState`] against a remote store.
///
/// Requests run as tokio tasks. Their completions queue on a channel and are applied
/// one at a time by whoever owns the synchronizer, so the state itself is never shared.
pub struct Synchronizer {
    state: ChatState,
    store: Arc<dyn ConversationStore>,
    notifier: Arc<dyn NotificationSink>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,
}

impl Synchronizer {
    pub fn new(store: Arc<dyn ConversationStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            state: ChatState::new(),
            store,
            notifier,
            completion_tx,
            completion_rx,
            in_flight: 0,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.state.snapshot()
    }

    pub fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    pub fn has_pending_requests(&self) -> bool {
        self.in_flight > 0
    }

    pub fn set_identity(&mut self, identity: Option<Identity>) {
        let effects = self.state.set_identity(identity);
        self.run(effects);
    }

    pub fn select_session(&mut self, session_id: &SessionId) {
        let effects = self.state.select_session(session_id);
        self.run(effects);
    }

    pub fn reload_messages(&mut self) {
        let effects = self.state.reload_messages();
        self.run(effects);
    }

    pub fn create_session(&mut self) -> Option<SessionId> {
        self.state.create_session(Utc::now())
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.state.set_input(text);
    }

    pub fn submit(&mut self) {
        let effects = self.state.submit(Utc::now());
        self.run(effects);
    }

    /// Waits for the next request to finish and applies it.
    ///
    /// Returns `false` without waiting when nothing is outstanding. Cancel-safe.
    pub async fn next_completion(&mut self) -> bool {
        if self.in_flight == 0 {
            return false;
        }

        match self.completion_rx.recv().await {
            Some(completion) => {
                self.apply(completion);
                true
            }
            None => false,
        }
    }

    /// Applies every completion that has already arrived, without waiting.
    pub fn drain_ready(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.apply(completion);
            applied += 1;
        }
        applied
    }

    /// Waits until no request is outstanding, including ones issued by completions.
    pub async fn settle(&mut self) {
        while self.next_completion().await {}
    }

    fn apply(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        tracing::trace!(kind = completion.kind(), "applying completion");

        let effects = match completion {
            Completion::SessionsLoaded { target, result } => {
                self.state.apply_sessions(target, result, Utc::now())
            }
            Completion::MessagesLoaded { target, result } => {
                self.state.apply_messages(target, result)
            }
            Completion::SendFinished {
                target,
                text,
                result,
            } => self
                .state
                .apply_send_result(target, text, result, Utc::now()),
        };
        self.run(effects);
    }

    fn run(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notify(notification) => self.notifier.notify(notification),
                Effect::FetchSessions(target) => {
                    let store = Arc::clone(&self.store);
                    self.spawn(async move {
                        let result = store.list_sessions(&target.user_id).await;
                        Completion::SessionsLoaded { target, result }
                    });
                }
                Effect::FetchMessages(target) => {
                    let store = Arc::clone(&self.store);
                    self.spawn(async move {
                        let result = store
                            .list_messages(&target.user_id, &target.session_id)
                            .await;
                        Completion::MessagesLoaded { target, result }
                    });
                }
                Effect::SendMessage { target, text } => {
                    let store = Arc::clone(&self.store);
                    self.spawn(async move {
                        let request = SendMessageRequest::chat(
                            target.user_id.clone(),
                            target.session_id.clone(),
                            text.clone(),
                        );
                        let result = store.send_message(request).await;
                        Completion::SendFinished {
                            target,
                            text,
                            result,
                        }
                    });
                }
            }
        }
    }

    fn spawn<F>(&mut self, request: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        self.in_flight += 1;
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let completion = request.await;
            let kind = completion.kind();
            if completion_tx.send(completion).is_err() {
                tracing::debug!(kind, "synchronizer dropped before request finished");
            }
        });
    }
}
