//! [`RecognitionSession`]: idempotent wrapper around one engine instance.

use super::engine::{
    EngineError, RecognitionEngine, RecognitionEngineFactory, RecognitionError, SignalSink,
};
use super::RecognitionSignal;
use crate::config::RecognitionConfig;

/// A single recogniser owned by the arbiter runner.
///
/// The session tracks whether it believes the engine is capturing so that
/// `stop` on an idle session never reaches the engine, and it swallows
/// [`EngineError::InvalidState`] from either direction.
pub struct RecognitionSession {
    engine: Box<dyn RecognitionEngine>,
    running: bool,
    language: String,
}

impl std::fmt::Debug for RecognitionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionSession")
            .field("running", &self.running)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl RecognitionSession {
    /// Build a session.  `config` is read here and only here.
    ///
    /// # Errors
    ///
    /// [`RecognitionError::EngineUnavailable`] when the host has no
    /// recogniser.
    pub fn new(
        factory: &dyn RecognitionEngineFactory,
        config: &RecognitionConfig,
        signals: SignalSink,
    ) -> Result<Self, RecognitionError> {
        let engine = factory.create(config, signals)?;
        log::debug!("recognition: session created (lang={})", config.language);
        Ok(Self {
            engine,
            running: false,
            language: config.language.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Ask the engine to begin capturing.  Calling it while a turn is in
    /// progress is not an error.
    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.engine.start() {
            Ok(()) => {
                self.running = true;
                Ok(())
            }
            Err(EngineError::InvalidState) => {
                log::debug!("recognition: start ignored, engine already running");
                self.running = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Ask the engine to finish the current turn.  No-op when idle.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        match self.engine.stop() {
            Ok(()) => Ok(()),
            Err(EngineError::InvalidState) => {
                log::debug!("recognition: stop ignored, engine already stopped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Keep the running flag in step with what the engine reports.
    pub fn observe(&mut self, signal: &RecognitionSignal) {
        match signal {
            RecognitionSignal::Started => self.running = true,
            s if s.closes_turn() => self.running = false,
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::recognition::{MockEngineFactory, UnavailableEngineFactory};

    fn session() -> (
        RecognitionSession,
        crate::recognition::MockEngineHandle,
        mpsc::UnboundedReceiver<RecognitionSignal>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (factory, handle) = MockEngineFactory::new();
        let config = RecognitionConfig {
            language: "en-US".into(),
            ..Default::default()
        };
        let session = RecognitionSession::new(&factory, &config, tx).unwrap();
        (session, handle, rx)
    }

    #[test]
    fn language_is_read_at_construction() {
        let (session, handle, _rx) = session();
        assert_eq!(session.language(), "en-US");
        assert_eq!(handle.config().unwrap().language, "en-US");
    }

    #[test]
    fn double_start_is_swallowed() {
        let (mut session, handle, mut rx) = session();

        session.start().unwrap();
        session.start().unwrap();

        assert!(session.is_running());
        assert_eq!(handle.start_calls(), 2);
        assert_eq!(rx.try_recv().unwrap(), RecognitionSignal::Started);
        assert!(rx.try_recv().is_err(), "no second Started");
    }

    #[test]
    fn stop_when_idle_does_not_reach_engine() {
        let (mut session, handle, _rx) = session();

        session.stop().unwrap();
        session.stop().unwrap();

        assert_eq!(handle.stop_calls(), 0);
        assert!(!session.is_running());
    }

    #[test]
    fn stop_after_engine_ended_on_its_own_is_swallowed() {
        let (mut session, handle, _rx) = session();
        session.start().unwrap();

        // Engine ends the turn (silence) but the session has not observed
        // it yet.
        handle.emit(RecognitionSignal::Ended);
        assert!(session.stop().is_ok());
        assert_eq!(handle.stop_calls(), 1);
    }

    #[test]
    fn runtime_errors_are_surfaced() {
        let (mut session, handle, _rx) = session();
        handle.fail_next_start("audio-capture");

        let err = session.start().unwrap_err();
        assert_eq!(err, EngineError::Runtime("audio-capture".into()));
        assert!(!session.is_running());
    }

    #[test]
    fn observe_tracks_engine_signals() {
        let (mut session, _handle, _rx) = session();

        session.observe(&RecognitionSignal::Started);
        assert!(session.is_running());

        session.observe(&RecognitionSignal::PartialResult { text: "he".into() });
        assert!(session.is_running());

        session.observe(&RecognitionSignal::Error {
            code: "no-speech".into(),
        });
        assert!(!session.is_running());
    }

    #[test]
    fn unavailable_host_fails_construction() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = RecognitionSession::new(
            &UnavailableEngineFactory::new("unsupported"),
            &RecognitionConfig::default(),
            tx,
        )
        .unwrap_err();
        assert!(matches!(err, RecognitionError::EngineUnavailable(_)));
    }
}
