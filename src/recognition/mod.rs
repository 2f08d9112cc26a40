//! Speech recognition session module.
//!
//! # Architecture
//!
//! ```text
//! RecognitionEngineFactory::create(config, signals)
//!        │
//!        ▼
//! Box<dyn RecognitionEngine>  ──start()/stop()──  RecognitionSession
//!        │
//!        └─▶ RecognitionSignal (mpsc) ──▶ ArbiterRunner
//! ```
//!
//! A [`RecognitionSession`] wraps exactly one engine instance.  It makes
//! `start` / `stop` idempotent: an engine answering "already in that state"
//! is logged at debug level and otherwise ignored.
//!
//! Hosts without a speech capability use [`UnavailableEngineFactory`]; the
//! runner then logs the condition once and keeps the text path working.

pub mod engine;
pub mod session;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use engine::{MockEngineFactory, MockEngineHandle};
pub use engine::{
    EngineError, RecognitionEngine, RecognitionEngineFactory, RecognitionError, SignalSink,
    UnavailableEngineFactory,
};
pub use session::RecognitionSession;

// ---------------------------------------------------------------------------
// RecognitionSignal
// ---------------------------------------------------------------------------

/// Lifecycle and result events of a single recognition turn.
///
/// For one turn an engine emits `Started` once, zero or more
/// `PartialResult`s, then exactly one of `FinalResult`, `Error` or a bare
/// `Ended`.  Engines usually follow a `FinalResult` or `Error` with an
/// `Ended` as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionSignal {
    Started,
    Ended,
    Error { code: String },
    PartialResult { text: String },
    FinalResult { text: String },
}

impl RecognitionSignal {
    /// `true` for signals after which the engine is no longer capturing.
    pub fn closes_turn(&self) -> bool {
        matches!(self, RecognitionSignal::Ended | RecognitionSignal::Error { .. })
    }
}
