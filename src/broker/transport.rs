//! Broker transport capability traits.
//!
//! The bridge only needs three things from a publish/subscribe client:
//! connect with options, subscribe to a topic list, and a stream of
//! lifecycle and message events.  [`BrokerConnector`] and
//! [`BrokerConnection`] capture exactly that, so a network client and the
//! in-process [`LoopbackBroker`](super::LoopbackBroker) are interchangeable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::BrokerConfig;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("subscription to {topics:?} failed: {reason}")]
    Subscribe { topics: Vec<String>, reason: String },

    #[error("broker connection closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Options and events
// ---------------------------------------------------------------------------

/// Everything a transport needs to open one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub url: String,
    pub client_id: String,
    pub keepalive: Duration,
    /// Wait between automatic reconnection attempts of the transport.
    pub reconnect_period: Duration,
}

impl ConnectOptions {
    /// Options for `config` with a freshly minted client id.
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            url: config.url.clone(),
            client_id: new_client_id(),
            keepalive: Duration::from_secs(config.keepalive_secs),
            reconnect_period: Duration::from_millis(config.reconnect_period_ms),
        }
    }
}

/// Lifecycle and data events of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// The session is up; subscriptions can be issued.
    Connected,
    Message { topic: String, payload: Vec<u8> },
    /// Transport-level error; the connection may recover on its own.
    Error(String),
    /// The connection is gone for good.
    Closed,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, options: ConnectOptions) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

#[async_trait]
pub trait BrokerConnection: Send {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), BrokerError>;

    /// Next event, or `None` once the connection has been torn down.
    async fn next_event(&mut self) -> Option<BrokerEvent>;

    async fn disconnect(&mut self);
}

// Compile-time assertion: both traits must stay object-safe.
const _: fn() = || {
    fn _assert_object_safe(_: &dyn BrokerConnector, _: Box<dyn BrokerConnection>) {}
};

// ---------------------------------------------------------------------------
// Client ids
// ---------------------------------------------------------------------------

static LAST_CLIENT_MILLIS: AtomicU64 = AtomicU64::new(0);

/// `ClientID_<unix millis>`.  Ids minted within the same millisecond are
/// bumped forward so that every connection gets a distinct id.
pub fn new_client_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let mut prev = LAST_CLIENT_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_CLIENT_MILLIS.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return format!("ClientID_{next}"),
            Err(actual) => prev = actual,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
