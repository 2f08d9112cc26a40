//! Shared conversation state.
//!
//! [`ConversationState`] is the single record that the input surface, the
//! broker bridge and the response pipeline observe.  The arbiter runner is
//! the only writer of the listening fields; [`CoordinatorHandle`] writes the
//! request fields.
//!
//! [`CoordinatorHandle`]: super::CoordinatorHandle

use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// ConversationState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    /// Auto-recognition mode, as last requested.
    pub auto_recognition: bool,

    /// A wake request is waiting to be consumed by the arbiter.
    pub wake_requested: bool,

    /// Number of assistant responses currently being generated.
    pub active_responses: usize,

    /// A recognition turn is capturing audio.
    pub is_listening: bool,

    /// Partial transcript of the turn in progress; empty between turns.
    pub live_transcript: String,

    /// `false` when the host has no speech recogniser.
    pub recognition_available: bool,
}

impl ConversationState {
    pub fn is_busy(&self) -> bool {
        self.active_responses > 0
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`ConversationState`].
///
/// Lock for short critical sections only and never across an `.await`.
pub type SharedState = Arc<Mutex<ConversationState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(ConversationState::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
