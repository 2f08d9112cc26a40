//! Arbiter runner: executes [`Effect`]s against the recognition session.
//!
//! [`ArbiterRunner`] owns the [`RecognitionArbiter`], the single
//! [`RecognitionSession`] and the restart timer.  It multiplexes three
//! sources in one `tokio::select!` loop:
//!
//! ```text
//! CoordinatorHandle ──ArbiterEvent──┐
//! RecognitionEngine ──Signal────────┼─▶ arbiter.handle() ─▶ effects
//! restart deadline ──timer fired────┘        │
//!                                            ├─ session.start()/stop()
//!                                            ├─ arm / disarm deadline
//!                                            ├─ hand transcript to the courier
//!                                            └─ mirror into SharedState
//! ```
//!
//! Transcripts go to a courier task that awaits each `deliver` before the
//! next, so a slow conversation handler never delays a busy signal reaching
//! the arbiter and transcripts arrive in the order they were finalized.
//! The runner waits for the courier to drain before it returns.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::machine::{ArbiterEvent, ArbiterSettings, Effect, RecognitionArbiter};
use crate::config::AppConfig;
use crate::conversation::{ConversationHandler, Role};
use crate::coordinator::SharedState;
use crate::recognition::{RecognitionEngineFactory, RecognitionSession, RecognitionSignal};

/// Error code fed back to the arbiter when no engine could take a start.
const UNAVAILABLE_CODE: &str = "recognition-unavailable";

enum Step {
    Event(ArbiterEvent),
    EventsClosed,
    Signal(RecognitionSignal),
    SignalsClosed,
    RestartDue,
}

/// A finalized transcript on its way to the conversation handler.
struct Transcript {
    text: String,
    role: Role,
}

// ---------------------------------------------------------------------------
// ArbiterRunner
// ---------------------------------------------------------------------------

pub struct ArbiterRunner {
    arbiter: RecognitionArbiter,
    session: Option<RecognitionSession>,
    signals: mpsc::UnboundedReceiver<RecognitionSignal>,
    signals_open: bool,
    handler: Arc<dyn ConversationHandler>,
    transcripts: mpsc::UnboundedSender<Transcript>,
    courier_rx: Option<mpsc::UnboundedReceiver<Transcript>>,
    state: SharedState,
    restart_at: Option<Instant>,
}

impl ArbiterRunner {
    /// Build the runner and its session.
    ///
    /// A factory reporting `EngineUnavailable` is logged once here; the
    /// runner then keeps answering events with recognition disabled.
    pub fn new(
        config: &AppConfig,
        factory: &dyn RecognitionEngineFactory,
        handler: Arc<dyn ConversationHandler>,
        state: SharedState,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = match RecognitionSession::new(factory, &config.recognition, tx) {
            Ok(session) => Some(session),
            Err(e) => {
                log::warn!("recognition: {e}; voice input disabled, text input still works");
                None
            }
        };
        let signals_open = session.is_some();
        state.lock().unwrap().recognition_available = signals_open;
        let (transcripts, courier_rx) = mpsc::unbounded_channel();

        Self {
            arbiter: RecognitionArbiter::new(ArbiterSettings::from_config(config)),
            session,
            signals: rx,
            signals_open,
            handler,
            transcripts,
            courier_rx: Some(courier_rx),
            state,
            restart_at: None,
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until [`ArbiterEvent::Shutdown`] arrives or every
    /// [`CoordinatorHandle`](crate::coordinator::CoordinatorHandle) is gone,
    /// then wait for pending transcripts to be delivered.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ArbiterEvent>) {
        let courier = self
            .courier_rx
            .take()
            .map(|rx| tokio::spawn(deliver_in_order(Arc::clone(&self.handler), rx)));

        loop {
            let restart_at = self.restart_at;
            let step = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => Step::Event(event),
                    None => Step::EventsClosed,
                },
                signal = self.signals.recv(), if self.signals_open => match signal {
                    Some(signal) => Step::Signal(signal),
                    None => Step::SignalsClosed,
                },
                () = tokio::time::sleep_until(restart_at.unwrap_or_else(Instant::now)),
                    if restart_at.is_some() => Step::RestartDue,
            };

            match step {
                Step::Event(ArbiterEvent::Shutdown) | Step::EventsClosed => {
                    self.dispatch(ArbiterEvent::Shutdown);
                    break;
                }
                Step::Event(event) => self.dispatch(event),
                Step::Signal(signal) => {
                    if let Some(session) = self.session.as_mut() {
                        session.observe(&signal);
                    }
                    self.dispatch(ArbiterEvent::Session(signal));
                }
                Step::SignalsClosed => {
                    log::warn!("recognition: engine dropped its signal channel");
                    self.signals_open = false;
                }
                Step::RestartDue => {
                    self.restart_at = None;
                    self.dispatch(ArbiterEvent::RestartTimerFired);
                }
            }
        }

        log::info!("arbiter: runner shutting down");
        drop(self.transcripts);
        if let Some(courier) = courier {
            if let Err(e) = courier.await {
                log::warn!("arbiter: transcript courier failed: {e}");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Effect execution
    // -----------------------------------------------------------------------

    fn dispatch(&mut self, event: ArbiterEvent) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            let now = Instant::now().into_std();
            for effect in self.arbiter.handle(event, now) {
                self.apply(effect, &mut pending);
            }
        }
        self.state.lock().unwrap().is_listening = self.arbiter.state().is_listening;
    }

    fn apply(&mut self, effect: Effect, pending: &mut VecDeque<ArbiterEvent>) {
        match effect {
            Effect::StartSession => {
                let code = match self.session.as_mut() {
                    Some(session) => match session.start() {
                        Ok(()) => return,
                        Err(e) => {
                            log::warn!("recognition: start failed: {e}");
                            e.to_string()
                        }
                    },
                    None => UNAVAILABLE_CODE.to_string(),
                };
                pending.push_back(ArbiterEvent::Session(RecognitionSignal::Error { code }));
            }
            Effect::StopSession => {
                if let Some(session) = self.session.as_mut() {
                    if let Err(e) = session.stop() {
                        log::warn!("recognition: stop failed: {e}");
                    }
                }
            }
            Effect::ScheduleRestart(delay) => {
                // Without an engine a restart could only fail again.
                if self.session.is_some() {
                    log::debug!("arbiter: restart in {}ms", delay.as_millis());
                    self.restart_at = Some(Instant::now() + delay);
                }
            }
            Effect::CancelRestart => self.restart_at = None,
            Effect::Deliver { text, role } => {
                log::info!(
                    "arbiter: delivering {:?} transcript ({} chars)",
                    self.arbiter.trigger(),
                    text.chars().count()
                );
                if self.transcripts.send(Transcript { text, role }).is_err() {
                    log::warn!("arbiter: transcript courier gone, transcript dropped");
                }
            }
            Effect::LiveText(text) => self.state.lock().unwrap().live_transcript = text,
            Effect::WakeConsumed => self.state.lock().unwrap().wake_requested = false,
        }
    }
}

async fn deliver_in_order(
    handler: Arc<dyn ConversationHandler>,
    mut rx: mpsc::UnboundedReceiver<Transcript>,
) {
    while let Some(Transcript { text, role }) = rx.recv().await {
        handler.deliver(text, Some(role), None).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::task::JoinHandle;

    use super::*;
    use crate::conversation::tests::RecordingHandler;
    use crate::conversation::Role;
    use crate::coordinator::{self, CoordinatorHandle};
    use crate::recognition::{MockEngineFactory, MockEngineHandle, UnavailableEngineFactory};

    struct Rig {
        handle: CoordinatorHandle,
        engine: MockEngineHandle,
        recorder: RecordingHandler,
        task: JoinHandle<()>,
    }

    fn spawn_rig() -> Rig {
        spawn_rig_with(RecordingHandler::default())
    }

    fn spawn_rig_with(recorder: RecordingHandler) -> Rig {
        let (handle, events) = coordinator::channel();
        let (factory, engine) = MockEngineFactory::new();
        let runner = ArbiterRunner::new(
            &AppConfig::default(),
            &factory,
            Arc::new(recorder.clone()),
            Arc::clone(handle.state()),
        );
        let task = tokio::spawn(runner.run(events));
        Rig {
            handle,
            engine,
            recorder,
            task,
        }
    }

    async fn wait_ms(n: u64) {
        tokio::time::sleep(Duration::from_millis(n)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn long_key_hold_delivers_final_text() {
        let rig = spawn_rig();

        rig.handle.key_down();
        wait_ms(10).await;
        assert!(rig.handle.snapshot().is_listening);

        rig.engine.emit(RecognitionSignal::PartialResult { text: "hel".into() });
        wait_ms(10).await;
        assert_eq!(rig.handle.snapshot().live_transcript, "hel");

        rig.engine.emit(RecognitionSignal::FinalResult { text: "hello".into() });
        wait_ms(1500).await;
        rig.handle.key_up();
        wait_ms(10).await;

        assert_eq!(rig.recorder.texts(), vec!["hello"]);
        let delivered = rig.recorder.delivered.lock().unwrap().clone();
        assert_eq!(delivered[0].1, Some(Role::User));
        let st = rig.handle.snapshot();
        assert!(!st.is_listening);
        assert!(st.live_transcript.is_empty());
        assert_eq!(rig.engine.stop_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn short_key_tap_delivers_nothing() {
        let rig = spawn_rig();

        rig.handle.key_down();
        wait_ms(10).await;
        rig.engine.emit(RecognitionSignal::FinalResult { text: "hi".into() });
        wait_ms(390).await;
        rig.handle.key_up();
        wait_ms(10).await;

        assert!(rig.recorder.texts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_mode_restarts_after_settle_delay() {
        let rig = spawn_rig();

        rig.handle.set_auto_recognition(true);
        wait_ms(10).await;
        assert_eq!(rig.engine.start_calls(), 1);

        // Engine ends the turn on silence.
        rig.engine.emit(RecognitionSignal::Ended);
        wait_ms(400).await;
        assert_eq!(rig.engine.start_calls(), 1);
        assert!(!rig.handle.snapshot().is_listening);

        wait_ms(200).await;
        assert_eq!(rig.engine.start_calls(), 2);
        assert!(rig.handle.snapshot().is_listening);
    }

    #[tokio::test(start_paused = true)]
    async fn assistant_response_pauses_auto_recognition() {
        let rig = spawn_rig();
        rig.handle.set_auto_recognition(true);
        wait_ms(10).await;
        rig.engine.emit(RecognitionSignal::PartialResult {
            text: "I was say".into(),
        });
        wait_ms(10).await;

        let guard = rig.handle.begin_response();
        wait_ms(10).await;
        assert_eq!(rig.engine.stop_calls(), 1);
        let st = rig.handle.snapshot();
        assert!(!st.is_listening);
        assert!(st.live_transcript.is_empty());

        wait_ms(2000).await;
        assert_eq!(rig.engine.start_calls(), 1, "no restart while responding");

        drop(guard);
        wait_ms(10).await;
        assert_eq!(rig.engine.start_calls(), 2);
        assert!(rig.handle.snapshot().is_listening);
        assert!(rig.recorder.texts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wake_during_response_fires_after_it() {
        let rig = spawn_rig();
        let guard = rig.handle.begin_response();

        rig.handle.request_wake();
        wait_ms(10).await;
        assert!(rig.handle.snapshot().wake_requested);
        assert_eq!(rig.engine.start_calls(), 0);

        drop(guard);
        wait_ms(10).await;
        let st = rig.handle.snapshot();
        assert!(!st.wake_requested);
        assert!(st.is_listening);
        assert!(!st.auto_recognition);
        assert_eq!(rig.engine.start_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wake_after_response_survives_the_stopped_turn_closing_late() {
        let rig = spawn_rig();
        rig.handle.toggle_mic();
        wait_ms(10).await;
        assert!(rig.handle.snapshot().is_listening);

        // No pause between the requests, so the engine's `Ended` for the
        // stopped turn races the wake through the runner's select loop.
        for round in 0..20 {
            let guard = rig.handle.begin_response();
            rig.handle.request_wake();
            drop(guard);
            wait_ms(10).await;

            let st = rig.handle.snapshot();
            assert!(st.is_listening, "wake lost in round {round}");
            assert!(!st.wake_requested);
        }
        assert_eq!(rig.engine.start_calls(), 21);
    }

    #[tokio::test(start_paused = true)]
    async fn quick_mic_off_and_on_keeps_listening() {
        let rig = spawn_rig();
        rig.handle.toggle_mic();
        wait_ms(10).await;

        rig.handle.toggle_mic();
        rig.handle.toggle_mic();
        wait_ms(10).await;

        assert!(rig.handle.snapshot().is_listening);
        assert!(rig.engine.is_running());
        assert_eq!(rig.engine.start_calls(), 2);
        assert_eq!(rig.engine.stop_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transcripts_reach_a_slow_handler_in_order() {
        let rig = spawn_rig_with(RecordingHandler::slow(Duration::from_millis(300)));
        rig.handle.toggle_mic();
        wait_ms(10).await;
        rig.engine.emit(RecognitionSignal::FinalResult { text: "first".into() });
        rig.engine.emit(RecognitionSignal::Ended);
        wait_ms(10).await;

        rig.handle.toggle_mic();
        wait_ms(10).await;
        rig.engine.emit(RecognitionSignal::FinalResult { text: "second".into() });
        wait_ms(10).await;
        // "first" is still in the handler; "second" waits behind it.
        assert!(rig.recorder.texts().is_empty());

        wait_ms(1000).await;
        assert_eq!(rig.recorder.texts(), vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn transcript_finalized_before_shutdown_is_delivered() {
        let rig = spawn_rig_with(RecordingHandler::slow(Duration::from_millis(500)));
        rig.handle.toggle_mic();
        wait_ms(10).await;

        rig.engine.emit(RecognitionSignal::FinalResult { text: "goodbye".into() });
        wait_ms(10).await;
        assert!(rig.recorder.texts().is_empty());
        rig.handle.shutdown();
        rig.task.await.unwrap();

        assert_eq!(rig.recorder.texts(), vec!["goodbye"]);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_turn_delivers_final_result() {
        let rig = spawn_rig();
        rig.handle.toggle_mic();
        wait_ms(10).await;
        rig.engine.emit(RecognitionSignal::FinalResult {
            text: " what time is it ".into(),
        });
        rig.engine.emit(RecognitionSignal::Ended);
        wait_ms(10).await;

        assert_eq!(rig.recorder.texts(), vec!["what time is it"]);
        assert!(!rig.handle.snapshot().is_listening);
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_leaves_runner_usable() {
        let rig = spawn_rig();
        rig.engine.fail_next_start("audio-capture");

        rig.handle.toggle_mic();
        wait_ms(10).await;
        assert!(!rig.handle.snapshot().is_listening);

        rig.handle.toggle_mic();
        wait_ms(10).await;
        assert!(rig.handle.snapshot().is_listening);
        assert_eq!(rig.engine.start_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_engine_keeps_runner_alive() {
        let (handle, events) = coordinator::channel();
        let recorder = RecordingHandler::default();
        let runner = ArbiterRunner::new(
            &AppConfig::default(),
            &UnavailableEngineFactory::new("console host"),
            Arc::new(recorder.clone()),
            Arc::clone(handle.state()),
        );
        assert!(!handle.snapshot().recognition_available);
        let task = tokio::spawn(runner.run(events));

        handle.set_auto_recognition(true);
        handle.toggle_mic();
        wait_ms(2000).await;
        assert!(!handle.snapshot().is_listening);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_listening_and_exits() {
        let rig = spawn_rig();
        rig.handle.toggle_mic();
        wait_ms(10).await;

        rig.handle.shutdown();
        rig.task.await.unwrap();

        assert!(!rig.engine.is_running());
        assert!(!rig.handle.snapshot().is_listening);
    }
}
