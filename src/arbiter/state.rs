//! Arbiter state record and listening phases.

use std::time::Instant;

// ---------------------------------------------------------------------------
// ListenPhase
// ---------------------------------------------------------------------------

/// Phases of the recognition lifecycle.
///
/// ```text
/// Idle ──start──▶ Listening ──stop / end / error──▶ Idle
/// Idle ──turn ended in auto mode──▶ AwaitingRestart ──timer──▶ Listening
/// AwaitingRestart ──busy / auto off──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenPhase {
    #[default]
    Idle,
    Listening,
    AwaitingRestart,
}

impl ListenPhase {
    pub fn label(&self) -> &'static str {
        match self {
            ListenPhase::Idle => "Idle",
            ListenPhase::Listening => "Listening",
            ListenPhase::AwaitingRestart => "Awaiting restart",
        }
    }
}

// ---------------------------------------------------------------------------
// TriggerSource
// ---------------------------------------------------------------------------

/// What caused the current turn to start.  Decides the delivery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Mic button.
    Manual,
    /// Auto-recognition mode (initial start or restart).
    Auto,
    /// External wake command.
    OneShot,
    /// Push-to-talk key hold.
    KeyHold,
}

// ---------------------------------------------------------------------------
// ArbiterState
// ---------------------------------------------------------------------------

/// The arbiter's view of the world.  Mutated only by
/// [`RecognitionArbiter::handle`](super::RecognitionArbiter::handle).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArbiterState {
    /// A recognition turn is capturing audio.  Implies `busy_count == 0`.
    pub is_listening: bool,
    /// Auto-recognition mode.
    pub auto_mode: bool,
    /// In-flight assistant response generations.
    pub busy_count: usize,
    /// A wake request is waiting for the assistant to go quiet.
    pub pending_one_shot: bool,
    /// When the push-to-talk key went down for the current hold.
    pub key_hold_started_at: Option<Instant>,
    /// The push-to-talk key is currently held and owns the turn.
    pub key_hold_is_active: bool,
    pub phase: ListenPhase,
}

impl ArbiterState {
    pub fn is_busy(&self) -> bool {
        self.busy_count > 0
    }
}
