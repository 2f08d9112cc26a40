//! Recognition engine capability traits.
//!
//! [`RecognitionEngine`] is the minimal control surface of a platform speech
//! recogniser: start capturing, stop capturing.  Results flow back
//! asynchronously as [`RecognitionSignal`]s on the [`SignalSink`] handed to
//! [`RecognitionEngineFactory::create`].
//!
//! [`MockEngineFactory`] (available under `#[cfg(test)]`) builds engines that
//! record calls and let a test inject signals.

use thiserror::Error;
use tokio::sync::mpsc;

use super::RecognitionSignal;
use crate::config::RecognitionConfig;

/// Channel on which an engine reports turn events.
pub type SignalSink = mpsc::UnboundedSender<RecognitionSignal>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors reported by a running engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// `start` on a running engine or `stop` on a stopped one.  Never
    /// surfaced past the session.
    #[error("recognition engine is already in the requested state")]
    InvalidState,

    /// Any other engine failure.
    #[error("recognition engine failure: {0}")]
    Runtime(String),
}

/// Errors that can arise while setting up recognition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    /// The host has no speech recognition capability.
    #[error("speech recognition is not available: {0}")]
    EngineUnavailable(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Control surface of a single recogniser instance.
pub trait RecognitionEngine: Send {
    /// Begin capturing.  Must return [`EngineError::InvalidState`] when
    /// already capturing.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Request graceful termination of the current turn.
    fn stop(&mut self) -> Result<(), EngineError>;
}

/// Builds engines; the place where a host reports missing capability.
pub trait RecognitionEngineFactory: Send + Sync {
    /// Construct an engine configured from `config`.  The configuration is
    /// read once here and must not change for the engine's lifetime.
    fn create(
        &self,
        config: &RecognitionConfig,
        signals: SignalSink,
    ) -> Result<Box<dyn RecognitionEngine>, RecognitionError>;
}

// Compile-time assertion: both traits must stay object-safe.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn RecognitionEngine>, _: &dyn RecognitionEngineFactory) {}
};

// ---------------------------------------------------------------------------
// UnavailableEngineFactory
// ---------------------------------------------------------------------------

/// Factory for hosts without speech recognition.  Always fails with
/// [`RecognitionError::EngineUnavailable`].
#[derive(Debug, Clone)]
pub struct UnavailableEngineFactory {
    reason: String,
}

impl UnavailableEngineFactory {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RecognitionEngineFactory for UnavailableEngineFactory {
    fn create(
        &self,
        _config: &RecognitionConfig,
        _signals: SignalSink,
    ) -> Result<Box<dyn RecognitionEngine>, RecognitionError> {
        Err(RecognitionError::EngineUnavailable(self.reason.clone()))
    }
}

// ---------------------------------------------------------------------------
// MockEngine  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::{MockEngineFactory, MockEngineHandle};


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_factory_reports_engine_unavailable() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let factory = UnavailableEngineFactory::new("no speech api");
        let err = factory
            .create(&RecognitionConfig::default(), tx)
            .err()
            .expect("must fail");
        assert_eq!(err, RecognitionError::EngineUnavailable("no speech api".into()));
        assert!(err.to_string().contains("no speech api"));
    }

    #[test]
    fn mock_engine_rejects_double_start() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (factory, handle) = MockEngineFactory::new();
        let mut engine = factory.create(&RecognitionConfig::default(), tx).unwrap();

        assert!(engine.start().is_ok());
        assert_eq!(engine.start(), Err(EngineError::InvalidState));
        assert_eq!(handle.start_calls(), 2);
        assert_eq!(rx.try_recv().unwrap(), RecognitionSignal::Started);
        assert!(rx.try_recv().is_err());
    }
}
