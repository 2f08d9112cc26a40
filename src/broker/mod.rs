//! Message broker ingestion.
//!
//! # Architecture
//!
//! ```text
//! BrokerConnector::connect(ConnectOptions)
//!        │
//!        ▼
//! BrokerBridge::run()  ← tokio task, re-keyed by watch<BrokerConfig>
//!        │
//!        ├─ control literal ─▶ CoordinatorHandle (auto mode / wake)
//!        └─ envelope        ─▶ IngestionQueue ─▶ ConversationHandler
//! ```
//!
//! The transport is reached only through [`BrokerConnector`] and
//! [`BrokerConnection`].  [`LoopbackBroker`] is the in-process
//! implementation used by the demo host and the tests.

pub mod bridge;
pub mod command;
pub mod envelope;
pub mod loopback;
pub mod transport;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use bridge::BrokerBridge;
pub use command::ControlCommand;
pub use envelope::{classify, EnvelopeError, Inbound, MessageEnvelope};
pub use loopback::{LoopbackBroker, LoopbackConnector};
pub use transport::{
    new_client_id, BrokerConnection, BrokerConnector, BrokerError, BrokerEvent, ConnectOptions,
};
