#![deny(unsafe_code)]

/// Conversation state kept in step with the remote store.
///
/// `ChatState` is the reducer; `Synchronizer` runs its requests and feeds the answers back.
pub mod chat;
/// Transcript export.
pub mod export;
pub mod format;
/// User-facing notices.
pub mod notify;
/// Settings persistence.
pub mod settings;
/// Line-oriented front end used by the `echome` binary.
pub mod terminal;
