/// Effects requested by state transitions and the completions routed back.
pub mod events;
/// Domain entities and request routing keys.
pub mod message;
pub mod state;
pub mod synchronizer;

pub use events::{Completion, Effect};
pub use message::{
    CreatedAtSource, Generation, HydrationTarget, Identity, ListingTarget, Message,
    MessageStatus, PENDING_REPLY_SENTINEL, SendTarget, Session, SessionOrigin,
    default_session_name,
};
pub use state::{ChatSnapshot, ChatState, SessionView};
pub use synchronizer::Synchronizer;
