//! Voice intake coordinator.
//!
//! Arbitrates a single speech-recognition session between the mic button,
//! a push-to-talk key, auto-recognition mode and one-shot wake requests,
//! and serialises chat lines arriving from a message broker into one
//! conversation handler.  Both paths pause while the assistant is
//! responding.

pub mod arbiter;
pub mod broker;
pub mod config;
pub mod conversation;
pub mod coordinator;
pub mod hotkey;
pub mod input;
pub mod queue;
pub mod recognition;
