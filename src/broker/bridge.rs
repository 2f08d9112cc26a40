//! Broker bridge: owns the subscription and routes payloads.
//!
//! ```text
//! watch<BrokerConfig> ──changed──▶ tear down + connect(fresh client id)
//! BrokerConnection ──Connected──▶ subscribe(topics)
//!                  ──Message────▶ classify()
//!                                   ├─ Command  ─▶ CoordinatorHandle
//!                                   └─ Envelope ─▶ QueueSender
//! ```

use std::sync::Arc;

use tokio::sync::watch;

use super::envelope::{classify, Inbound};
use super::transport::{BrokerConnection, BrokerConnector, BrokerEvent, ConnectOptions};
use crate::config::BrokerConfig;
use crate::coordinator::CoordinatorHandle;
use crate::queue::QueueSender;

/// Settings whose change forces a new connection.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnectionKey {
    enabled: bool,
    url: String,
    topic: String,
}

impl ConnectionKey {
    fn of(config: &BrokerConfig) -> Self {
        Self {
            enabled: config.enabled,
            url: config.url.clone(),
            topic: config.topic.clone(),
        }
    }
}

enum Step {
    SettingsChanged,
    SettingsClosed,
    Event(BrokerEvent),
    ConnectionGone,
}

// ---------------------------------------------------------------------------
// BrokerBridge
// ---------------------------------------------------------------------------

pub struct BrokerBridge {
    connector: Arc<dyn BrokerConnector>,
    settings: watch::Receiver<BrokerConfig>,
    handle: CoordinatorHandle,
    queue: QueueSender,
    connection: Option<Box<dyn BrokerConnection>>,
    topics: Vec<String>,
    applied: Option<ConnectionKey>,
}

impl BrokerBridge {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        settings: watch::Receiver<BrokerConfig>,
        handle: CoordinatorHandle,
        queue: QueueSender,
    ) -> Self {
        Self {
            connector,
            settings,
            handle,
            queue,
            connection: None,
            topics: Vec::new(),
            applied: None,
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until the settings sender is dropped.
    pub async fn run(mut self) {
        let initial = self.settings.borrow_and_update().clone();
        self.apply_settings(&initial).await;

        loop {
            let step = tokio::select! {
                changed = self.settings.changed() => match changed {
                    Ok(()) => Step::SettingsChanged,
                    Err(_) => Step::SettingsClosed,
                },
                event = next_event(self.connection.as_mut()) => match event {
                    Some(event) => Step::Event(event),
                    None => Step::ConnectionGone,
                },
            };

            match step {
                Step::SettingsChanged => {
                    let config = self.settings.borrow_and_update().clone();
                    self.apply_settings(&config).await;
                }
                Step::SettingsClosed => break,
                Step::Event(event) => self.on_event(event).await,
                Step::ConnectionGone => {
                    log::info!("broker: connection ended");
                    self.connection = None;
                }
            }
        }

        self.teardown().await;
        log::info!("broker: settings channel closed, bridge shutting down");
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    async fn apply_settings(&mut self, config: &BrokerConfig) {
        let key = ConnectionKey::of(config);
        if self.applied.as_ref() == Some(&key) {
            return;
        }
        self.teardown().await;
        self.applied = Some(key);

        if !config.is_active() {
            log::info!("broker: disabled or no url configured, not connecting");
            return;
        }

        let options = ConnectOptions::from_config(config);
        log::info!("broker: connecting to {} as {}", options.url, options.client_id);
        match self.connector.connect(options).await {
            Ok(connection) => {
                self.connection = Some(connection);
                self.topics = config.topics();
            }
            Err(e) => log::error!("broker: {e}"),
        }
    }

    async fn teardown(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            log::info!("broker: closing connection");
            connection.disconnect().await;
        }
        self.topics.clear();
    }

    async fn on_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected => {
                log::info!("broker: connection opened");
                if self.topics.is_empty() {
                    return;
                }
                let Some(connection) = self.connection.as_mut() else {
                    return;
                };
                match connection.subscribe(&self.topics).await {
                    Ok(()) => log::info!("broker: subscribed to {:?}", self.topics),
                    Err(e) => log::error!("broker: {e}"),
                }
            }
            BrokerEvent::Message { topic, payload } => {
                log::debug!("broker: message on {topic} ({} bytes)", payload.len());
                self.ingest(&payload);
            }
            BrokerEvent::Error(message) => log::error!("broker: transport error: {message}"),
            BrokerEvent::Closed => log::info!("broker: connection closed"),
        }
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    fn ingest(&self, payload: &[u8]) {
        match classify(payload) {
            Inbound::Command(command) => self.handle.apply_command(command),
            Inbound::Envelope(envelope) => {
                self.queue.push(envelope);
            }
        }
    }
}

async fn next_event(connection: Option<&mut Box<dyn BrokerConnection>>) -> Option<BrokerEvent> {
    match connection {
        Some(connection) => connection.next_event().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
