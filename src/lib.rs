//! Client core of an AI coding assistant: streams provider deltas from a
//! backend relay as SSE, decodes tool input incrementally while it arrives,
//! writes files progressively, and drives a bounded multi-round tool loop.
//!
//! The crate is headless. A chat surface consumes [`events::UiEvent`]s from
//! an unbounded channel and feeds user decisions back through
//! [`chat::ConfirmationGate`].

pub mod api;
pub mod chat;
pub mod config;
pub mod events;
pub mod plugin;
pub mod tools;
pub mod types;
pub mod util;
pub mod workspace;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;
