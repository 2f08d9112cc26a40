//! Recognition arbitration.
//!
//! Four triggers compete for the single recognition session: the mic
//! button, the push-to-talk key, auto-recognition mode and one-shot wake
//! requests.  They are reconciled against the "assistant is responding"
//! count so that the user is never being listened to while the assistant
//! speaks.
//!
//! # Architecture
//!
//! ```text
//! CoordinatorHandle ──ArbiterEvent (mpsc)──▶ ArbiterRunner::run()  ← tokio task
//!                                                 │
//!                                                 ├─ RecognitionArbiter::handle(event, now)
//!                                                 │      └─▶ Vec<Effect>
//!                                                 ├─ RecognitionSession start / stop
//!                                                 ├─ restart timer
//!                                                 └─ ConversationHandler::deliver (spawned)
//! ```
//!
//! [`RecognitionArbiter`] is synchronous and clock-free; [`ArbiterRunner`]
//! is the only place that touches the engine or the tokio timer.

pub mod machine;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use machine::{ArbiterEvent, ArbiterSettings, Effect, RecognitionArbiter};
pub use runner::ArbiterRunner;
pub use state::{ArbiterState, ListenPhase, TriggerSource};
