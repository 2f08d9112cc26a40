//! The recognition arbiter state machine.
//!
//! [`RecognitionArbiter::handle`] is a pure transition function: it takes one
//! [`ArbiterEvent`] plus the current time and returns the [`Effect`]s the
//! runner has to carry out.  It never touches the engine, the clock or the
//! conversation handler itself, so every policy below is testable without
//! a live recogniser.
//!
//! # Policies
//!
//! * Nothing starts while the assistant is busy (`busy_count > 0`), and a
//!   busy signal stops a running turn immediately.
//! * Auto mode restarts listening after a turn closes, after
//!   [`ArbiterSettings::restart_delay`].  A busy signal or auto mode being
//!   switched off cancels a pending restart.
//! * A wake request received while busy is kept until the assistant goes
//!   quiet, then consumed.
//! * Push-to-talk transcripts are delivered only when the key was held for
//!   at least [`ArbiterSettings::min_hold`].  Every other trigger delivers
//!   any non-empty final transcript.
//! * A start requested while the engine is still closing a stopped turn is
//!   held back until that turn's `Ended` (or `Error`) arrives, so a late
//!   close is never mistaken for the end of the next turn.

use std::time::{Duration, Instant};

use super::state::{ArbiterState, ListenPhase, TriggerSource};
use crate::config::AppConfig;
use crate::conversation::Role;
use crate::recognition::RecognitionSignal;

// ---------------------------------------------------------------------------
// Events and effects
// ---------------------------------------------------------------------------

/// Inputs to the arbiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterEvent {
    /// Mic button pressed.
    ManualToggle,
    /// Auto-recognition switched on or off.
    AutoModeChanged(bool),
    /// New number of in-flight assistant responses.
    BusyCountChanged(usize),
    /// External one-shot wake request.
    OneShotTrigger,
    /// Push-to-talk chord went down.
    KeyDown,
    /// Push-to-talk key went up.
    KeyUp,
    /// Event reported by the recognition engine.
    Session(RecognitionSignal),
    /// The auto-restart timer elapsed.
    RestartTimerFired,
    /// Host is shutting down.
    Shutdown,
}

/// Work the runner must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartSession,
    StopSession,
    /// Arm the restart timer; fires [`ArbiterEvent::RestartTimerFired`].
    ScheduleRestart(Duration),
    CancelRestart,
    /// Hand a finalized transcript to the conversation handler.
    Deliver { text: String, role: Role },
    /// Replace the live (not yet final) transcript shown to the user.
    LiveText(String),
    /// The pending wake request has been used up.
    WakeConsumed,
}

// ---------------------------------------------------------------------------
// ArbiterSettings
// ---------------------------------------------------------------------------

/// Timing constants of the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterSettings {
    /// Settle delay before auto mode restarts listening.
    pub restart_delay: Duration,
    /// Minimum push-to-talk hold for a transcript to be sent.
    pub min_hold: Duration,
}

impl ArbiterSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            restart_delay: config.recognition.restart_delay(),
            min_hold: config.hotkey.min_hold(),
        }
    }
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Turn bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Turn {
    trigger: Option<TriggerSource>,
    /// Latest partial transcript.
    live: String,
    /// Push-to-talk text waiting for the hold decision.
    captured: Option<String>,
    /// How long the key was held, once released.
    held_for: Option<Duration>,
    /// The push-to-talk decision has been taken for this turn.
    settled: bool,
}

impl Turn {
    fn new(trigger: TriggerSource) -> Self {
        Self {
            trigger: Some(trigger),
            ..Self::default()
        }
    }

    fn is_key_hold(&self) -> bool {
        self.trigger == Some(TriggerSource::KeyHold)
    }
}

// ---------------------------------------------------------------------------
// EngineTurn
// ---------------------------------------------------------------------------

/// What the arbiter last asked of the engine, and what it has confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EngineTurn {
    #[default]
    Idle,
    /// `StartSession` issued, `Started` not yet seen.
    Starting,
    Running,
    /// `StopSession` issued, the closing signal not yet seen.
    Stopping,
}

// ---------------------------------------------------------------------------
// RecognitionArbiter
// ---------------------------------------------------------------------------

/// Decides when the recognition session runs and which transcripts are
/// delivered.
#[derive(Debug)]
pub struct RecognitionArbiter {
    state: ArbiterState,
    settings: ArbiterSettings,
    turn: Turn,
    engine: EngineTurn,
    /// A turn is requested or listening; cleared by any stop.
    wants_session: bool,
    /// Start held back until the engine finishes stopping.
    queued: Option<TriggerSource>,
    /// The last engine turn closed with `Error`; a trailing `Ended` belongs
    /// to it.
    trailing_end: bool,
}

impl RecognitionArbiter {
    pub fn new(settings: ArbiterSettings) -> Self {
        Self {
            state: ArbiterState::default(),
            settings,
            turn: Turn::default(),
            engine: EngineTurn::Idle,
            wants_session: false,
            queued: None,
            trailing_end: false,
        }
    }

    pub fn state(&self) -> &ArbiterState {
        &self.state
    }

    /// Trigger of the turn in progress (or of the last one).
    pub fn trigger(&self) -> Option<TriggerSource> {
        self.turn.trigger
    }

    /// Apply one event and return the effects to execute, in order.
    pub fn handle(&mut self, event: ArbiterEvent, now: Instant) -> Vec<Effect> {
        let mut fx = Vec::new();
        log::debug!(
            "arbiter: {:?} in {} (busy={})",
            event,
            self.state.phase.label(),
            self.state.busy_count
        );

        match event {
            ArbiterEvent::ManualToggle => self.on_manual_toggle(&mut fx),
            ArbiterEvent::AutoModeChanged(enabled) => self.on_auto_mode_changed(enabled, &mut fx),
            ArbiterEvent::BusyCountChanged(n) => self.on_busy_count_changed(n, &mut fx),
            ArbiterEvent::OneShotTrigger => self.on_one_shot_trigger(&mut fx),
            ArbiterEvent::KeyDown => self.on_key_down(now, &mut fx),
            ArbiterEvent::KeyUp => self.on_key_up(now, &mut fx),
            ArbiterEvent::Session(signal) => self.on_session_event(signal, &mut fx),
            ArbiterEvent::RestartTimerFired => self.on_restart_timer_fired(&mut fx),
            ArbiterEvent::Shutdown => {
                self.cancel_restart(&mut fx);
                self.state.key_hold_is_active = false;
                self.state.key_hold_started_at = None;
                self.stop(&mut fx);
            }
        }

        fx
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    fn on_manual_toggle(&mut self, fx: &mut Vec<Effect>) {
        if self.is_capturing() {
            self.stop(fx);
        } else {
            self.try_start(TriggerSource::Manual, fx);
        }
    }

    fn on_auto_mode_changed(&mut self, enabled: bool, fx: &mut Vec<Effect>) {
        self.state.auto_mode = enabled;
        if enabled {
            if !self.is_capturing() {
                self.try_start(TriggerSource::Auto, fx);
            }
        } else {
            self.cancel_restart(fx);
            if self.is_capturing() {
                self.stop(fx);
            }
        }
    }

    fn on_busy_count_changed(&mut self, n: usize, fx: &mut Vec<Effect>) {
        self.state.busy_count = n;
        if n > 0 {
            self.cancel_restart(fx);
            if self.is_capturing() {
                log::debug!("arbiter: assistant took the floor, stopping recognition");
                self.stop(fx);
            }
            return;
        }

        if self.state.pending_one_shot {
            self.consume_wake(fx);
            self.try_start(TriggerSource::OneShot, fx);
        } else if self.state.auto_mode && !self.is_capturing() {
            self.try_start(TriggerSource::Auto, fx);
        }
    }

    fn on_one_shot_trigger(&mut self, fx: &mut Vec<Effect>) {
        self.state.pending_one_shot = true;
        if self.state.is_busy() {
            log::debug!("arbiter: wake deferred until the assistant is idle");
            return;
        }
        self.consume_wake(fx);
        self.try_start(TriggerSource::OneShot, fx);
    }

    fn on_key_down(&mut self, now: Instant, fx: &mut Vec<Effect>) {
        if self.state.key_hold_is_active {
            // Auto-repeat.
            return;
        }
        if self.is_capturing() {
            log::debug!("arbiter: push-to-talk ignored, already listening");
            return;
        }
        if self.try_start(TriggerSource::KeyHold, fx) {
            self.state.key_hold_started_at = Some(now);
            self.state.key_hold_is_active = true;
        }
    }

    fn on_key_up(&mut self, now: Instant, fx: &mut Vec<Effect>) {
        if !self.state.key_hold_is_active {
            return;
        }
        self.state.key_hold_is_active = false;
        let held = self
            .state
            .key_hold_started_at
            .take()
            .map(|pressed| now.saturating_duration_since(pressed))
            .unwrap_or_default();

        // Released before the engine was free to start the hold.
        if self.queued == Some(TriggerSource::KeyHold) {
            self.stop(fx);
            return;
        }
        // The hold may have lost its turn to a busy stop and a later restart.
        if !self.turn.is_key_hold() {
            return;
        }
        self.turn.held_for = Some(held);
        self.stop(fx);
        self.settle_key_hold(fx);
    }

    fn on_session_event(&mut self, signal: RecognitionSignal, fx: &mut Vec<Effect>) {
        match signal {
            RecognitionSignal::Started => self.on_started(fx),
            RecognitionSignal::PartialResult { text } => {
                self.turn.live.clone_from(&text);
                fx.push(Effect::LiveText(text));
            }
            RecognitionSignal::FinalResult { text } => {
                self.turn.live.clear();
                fx.push(Effect::LiveText(String::new()));
                if self.turn.is_key_hold() {
                    self.turn.captured = Some(text);
                    self.settle_key_hold(fx);
                } else {
                    self.deliver(&text, fx);
                }
            }
            RecognitionSignal::Error { code } => {
                log::warn!("arbiter: recognition turn aborted: {code}");
                self.on_engine_closed(true, fx);
            }
            RecognitionSignal::Ended => self.on_engine_closed(false, fx),
        }
    }

    fn on_started(&mut self, fx: &mut Vec<Effect>) {
        self.trailing_end = false;
        match self.engine {
            EngineTurn::Starting if self.wants_session && !self.state.is_busy() => {
                self.engine = EngineTurn::Running;
                self.state.is_listening = true;
                self.state.phase = ListenPhase::Listening;
            }
            EngineTurn::Running => {}
            EngineTurn::Stopping => {
                // The stopped turn came up after all; make sure it goes down.
                log::debug!("arbiter: engine started a stopped turn, stopping again");
                fx.push(Effect::StopSession);
            }
            EngineTurn::Starting | EngineTurn::Idle => {
                log::debug!("arbiter: engine started but no turn is wanted, stopping");
                self.wants_session = false;
                self.engine = EngineTurn::Stopping;
                fx.push(Effect::StopSession);
            }
        }
    }

    fn on_engine_closed(&mut self, by_error: bool, fx: &mut Vec<Effect>) {
        // `Started` clears the flag, so this cannot be the end of a running turn.
        if !by_error && std::mem::take(&mut self.trailing_end) {
            log::debug!("arbiter: trailing end of an aborted turn ignored");
            return;
        }
        match self.engine {
            EngineTurn::Idle => {
                log::debug!("arbiter: close signal with no engine turn open, ignored");
                return;
            }
            EngineTurn::Starting | EngineTurn::Running => {
                self.engine = EngineTurn::Idle;
                self.on_turn_closed(fx);
            }
            EngineTurn::Stopping => {
                self.engine = EngineTurn::Idle;
                match self.queued.take() {
                    Some(trigger) => {
                        self.finish_turn_text(fx);
                        self.begin_turn(trigger, fx);
                    }
                    None => self.on_turn_closed(fx),
                }
            }
        }
        self.trailing_end = by_error;
    }

    fn on_turn_closed(&mut self, fx: &mut Vec<Effect>) {
        self.state.is_listening = false;
        self.wants_session = false;
        if self.state.phase == ListenPhase::Listening {
            self.state.phase = ListenPhase::Idle;
        }
        self.finish_turn_text(fx);

        if self.state.auto_mode
            && !self.state.is_busy()
            && !self.state.key_hold_is_active
            && self.state.phase == ListenPhase::Idle
        {
            self.state.phase = ListenPhase::AwaitingRestart;
            fx.push(Effect::ScheduleRestart(self.settings.restart_delay));
        }
    }

    /// Drop the partial transcript, or keep it as the capture of a
    /// push-to-talk turn.
    fn finish_turn_text(&mut self, fx: &mut Vec<Effect>) {
        let partial = std::mem::take(&mut self.turn.live);
        if !partial.is_empty() {
            fx.push(Effect::LiveText(String::new()));
        }
        if self.turn.is_key_hold() {
            if self.turn.captured.is_none() && !partial.trim().is_empty() {
                self.turn.captured = Some(partial);
            }
            self.settle_key_hold(fx);
        }
    }

    fn on_restart_timer_fired(&mut self, fx: &mut Vec<Effect>) {
        if self.state.phase != ListenPhase::AwaitingRestart {
            return;
        }
        self.state.phase = ListenPhase::Idle;
        if self.state.auto_mode && !self.state.is_busy() {
            self.try_start(TriggerSource::Auto, fx);
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Listening, or a start is on its way.
    fn is_capturing(&self) -> bool {
        self.wants_session
    }

    fn try_start(&mut self, trigger: TriggerSource, fx: &mut Vec<Effect>) -> bool {
        if self.state.is_busy() {
            log::debug!("arbiter: {trigger:?} start refused, assistant busy");
            return false;
        }
        if self.is_capturing() {
            return false;
        }
        self.cancel_restart(fx);
        self.wants_session = true;
        if self.engine == EngineTurn::Idle {
            self.begin_turn(trigger, fx);
        } else {
            log::debug!("arbiter: {trigger:?} start waits for the engine to finish stopping");
            self.queued = Some(trigger);
        }
        true
    }

    fn begin_turn(&mut self, trigger: TriggerSource, fx: &mut Vec<Effect>) {
        self.turn = Turn::new(trigger);
        self.engine = EngineTurn::Starting;
        fx.push(Effect::StartSession);
    }

    fn stop(&mut self, fx: &mut Vec<Effect>) {
        if self.wants_session && self.queued.take().is_none() {
            if let EngineTurn::Starting | EngineTurn::Running = self.engine {
                self.engine = EngineTurn::Stopping;
                fx.push(Effect::StopSession);
            }
        }
        self.state.is_listening = false;
        self.wants_session = false;
        if self.state.phase == ListenPhase::Listening {
            self.state.phase = ListenPhase::Idle;
        }
    }

    fn cancel_restart(&mut self, fx: &mut Vec<Effect>) {
        if self.state.phase == ListenPhase::AwaitingRestart {
            self.state.phase = ListenPhase::Idle;
            fx.push(Effect::CancelRestart);
        }
    }

    fn consume_wake(&mut self, fx: &mut Vec<Effect>) {
        self.state.pending_one_shot = false;
        fx.push(Effect::WakeConsumed);
    }

    /// Deliver the push-to-talk transcript once both the release and the
    /// text are known.
    fn settle_key_hold(&mut self, fx: &mut Vec<Effect>) {
        if self.turn.settled {
            return;
        }
        let Some(held) = self.turn.held_for else {
            return;
        };
        let Some(text) = self.turn.captured.take() else {
            return;
        };
        self.turn.settled = true;
        if held < self.settings.min_hold {
            log::debug!(
                "arbiter: push-to-talk held {}ms, transcript discarded",
                held.as_millis()
            );
            return;
        }
        self.deliver(&text, fx);
    }

    fn deliver(&mut self, text: &str, fx: &mut Vec<Effect>) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        fx.push(Effect::Deliver {
            text: text.to_string(),
            role: Role::User,
        });
    }
}

impl Default for RecognitionArbiter {
    fn default() -> Self {
        Self::new(ArbiterSettings::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
