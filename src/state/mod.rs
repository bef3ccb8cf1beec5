//! Session state machines.
//!
//! Both reducers are pure: they take the current state by value and return
//! the next one. All mutation goes through an action, including bulk patches.
//! Unknown action tags (e.g. from a newer client) deserialize to `Unknown`
//! and leave the state untouched.

pub mod chat;
pub mod step;

pub use chat::{reduce_conversation, ChatAction, ConversationPatch, ConversationState};
pub use step::{reduce_step_debug, StepAction, StepDebugPatch, StepDebugState};
