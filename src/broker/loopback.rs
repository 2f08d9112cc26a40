//! In-process broker.
//!
//! [`LoopbackBroker`] routes published payloads to every live connection
//! subscribed to the exact topic string.  The demo host uses it as its
//! only transport and the bridge tests use it to observe the connection
//! lifecycle.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::transport::{BrokerConnection, BrokerConnector, BrokerError, BrokerEvent, ConnectOptions};

#[derive(Debug)]
struct Client {
    id: u64,
    client_id: String,
    url: String,
    topics: Vec<String>,
    tx: mpsc::UnboundedSender<BrokerEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    clients: Vec<Client>,
    /// Every client id that ever connected, in order.
    history: Vec<String>,
    reject_subscriptions: bool,
    refuse_connections: bool,
}

// ---------------------------------------------------------------------------
// LoopbackBroker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct LoopbackBroker {
    inner: Arc<Mutex<Inner>>,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            broker: self.clone(),
        }
    }

    /// Deliver `payload` to every client subscribed to `topic`.  Returns the
    /// number of recipients.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> usize {
        let payload = payload.into();
        let inner = self.inner.lock().unwrap();
        let mut delivered = 0;
        for client in inner.clients.iter().filter(|c| c.topics.iter().any(|t| t == topic)) {
            let event = BrokerEvent::Message {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            if client.tx.send(event).is_ok() {
                delivered += 1;
            }
        }
        log::debug!("loopback: {topic} -> {delivered} subscriber(s)");
        delivered
    }

    /// Client ids of every connection ever opened, oldest first.
    pub fn connection_history(&self) -> Vec<String> {
        self.inner.lock().unwrap().history.clone()
    }

    /// `(client_id, url)` of the currently open connections.
    pub fn live_clients(&self) -> Vec<(String, String)> {
        self.inner
            .lock()
            .unwrap()
            .clients
            .iter()
            .map(|c| (c.client_id.clone(), c.url.clone()))
            .collect()
    }

    /// Topics of the currently open connections.
    pub fn subscriptions(&self) -> Vec<Vec<String>> {
        self.inner.lock().unwrap().clients.iter().map(|c| c.topics.clone()).collect()
    }

    pub fn reject_subscriptions(&self, reject: bool) {
        self.inner.lock().unwrap().reject_subscriptions = reject;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.lock().unwrap().refuse_connections = refuse;
    }

    /// Report a transport error to every open connection.
    pub fn broadcast_error(&self, message: &str) {
        for client in &self.inner.lock().unwrap().clients {
            let _ = client.tx.send(BrokerEvent::Error(message.to_string()));
        }
    }

    fn remove(&self, id: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.clients.retain(|c| c.id != id);
        }
    }
}

// ---------------------------------------------------------------------------
// Connector / connection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    broker: LoopbackBroker,
}

#[async_trait]
impl BrokerConnector for LoopbackConnector {
    async fn connect(&self, options: ConnectOptions) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let mut inner = self.broker.inner.lock().unwrap();
        if inner.refuse_connections {
            return Err(BrokerError::Connect {
                url: options.url,
                reason: "connection refused".into(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(BrokerEvent::Connected);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.history.push(options.client_id.clone());
        inner.clients.push(Client {
            id,
            client_id: options.client_id,
            url: options.url,
            topics: Vec::new(),
            tx,
        });

        Ok(Box::new(LoopbackConnection {
            id,
            broker: self.broker.clone(),
            rx,
        }))
    }
}

struct LoopbackConnection {
    id: u64,
    broker: LoopbackBroker,
    rx: mpsc::UnboundedReceiver<BrokerEvent>,
}

#[async_trait]
impl BrokerConnection for LoopbackConnection {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), BrokerError> {
        let mut inner = self.broker.inner.lock().unwrap();
        if inner.reject_subscriptions {
            return Err(BrokerError::Subscribe {
                topics: topics.to_vec(),
                reason: "not authorized".into(),
            });
        }
        let client = inner
            .clients
            .iter_mut()
            .find(|c| c.id == self.id)
            .ok_or(BrokerError::Closed)?;
        client.topics = topics.to_vec();
        Ok(())
    }

    async fn next_event(&mut self) -> Option<BrokerEvent> {
        self.rx.recv().await
    }

    async fn disconnect(&mut self) {
        self.broker.remove(self.id);
        self.rx.close();
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        self.broker.remove(self.id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
