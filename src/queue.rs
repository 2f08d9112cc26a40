//! Ingestion queue: serialises broker envelopes into the conversation
//! handler.
//!
//! ```text
//! BrokerBridge ──QueueSender::push──▶ mpsc ──▶ IngestionQueue::run()  ← tokio task
//!                                                   │
//!                                                   └─ normalize role, await handler.deliver()
//! ```
//!
//! Envelopes are delivered in arrival order and the next one is not taken
//! off the channel until the previous `deliver` has returned, so the
//! handler never sees two broker messages at once.  Pushing never waits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::broker::MessageEnvelope;
use crate::conversation::ConversationHandler;

// ---------------------------------------------------------------------------
// QueueSender
// ---------------------------------------------------------------------------

/// Producer side of the queue.
#[derive(Clone)]
pub struct QueueSender {
    tx: mpsc::UnboundedSender<MessageEnvelope>,
    pending: Arc<AtomicUsize>,
}

impl QueueSender {
    /// Append an envelope.  Returns `false` if the queue has shut down.
    pub fn push(&self, envelope: MessageEnvelope) -> bool {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(envelope).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            log::warn!("queue: ingestion queue closed, envelope dropped");
            return false;
        }
        true
    }

    /// Envelopes accepted but not yet fully delivered, including the one in
    /// flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// IngestionQueue
// ---------------------------------------------------------------------------

pub struct IngestionQueue {
    rx: mpsc::UnboundedReceiver<MessageEnvelope>,
    handler: Arc<dyn ConversationHandler>,
    pending: Arc<AtomicUsize>,
}

impl IngestionQueue {
    pub fn new(handler: Arc<dyn ConversationHandler>) -> (Self, QueueSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let sender = QueueSender {
            tx,
            pending: Arc::clone(&pending),
        };
        let queue = Self {
            rx,
            handler,
            pending,
        };
        (queue, sender)
    }

    /// Drain the queue until every [`QueueSender`] is dropped.
    pub async fn run(mut self) {
        while let Some(envelope) = self.rx.recv().await {
            let envelope = envelope.normalize_role();
            log::debug!(
                "queue: delivering {} message ({} chars)",
                envelope.role,
                envelope.text.chars().count()
            );
            self.handler
                .deliver(envelope.text, Some(envelope.role), envelope.state)
                .await;
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }

        log::info!("queue: all senders gone, ingestion queue shutting down");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
