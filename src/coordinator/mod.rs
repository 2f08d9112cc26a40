//! Coordinator: wires the arbiter, the ingestion queue and the broker
//! bridge around one shared state.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────── SharedState ────────────────┐
//!                      │                                             │
//! InputSurface ─┐      │                                             │
//! KeyListener ──┼─▶ CoordinatorHandle ──ArbiterEvent──▶ ArbiterRunner ──▶ ConversationHandler
//! BrokerBridge ─┘      ▲                                             ▲
//!      │               └──── begin_response() (response pipeline)    │
//!      └──────────────▶ QueueSender ──▶ IngestionQueue ──────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_intake::broker::LoopbackBroker;
//! use voice_intake::config::AppConfig;
//! use voice_intake::coordinator::{self, Coordinator};
//! use voice_intake::recognition::UnavailableEngineFactory;
//!
//! # use voice_intake::conversation::ConversationHandler;
//! # fn make_handler() -> Arc<dyn ConversationHandler> { unimplemented!() }
//! # async fn example() {
//! let config = AppConfig::default();
//! let broker = LoopbackBroker::new();
//! let coordinator = Coordinator::start(
//!     coordinator::channel(),
//!     &config,
//!     &UnavailableEngineFactory::new("no recogniser"),
//!     Arc::new(broker.connector()),
//!     make_handler(),
//! );
//!
//! coordinator.handle().set_auto_recognition(true);
//! coordinator.shutdown().await;
//! # }
//! ```

pub mod handle;
pub mod state;

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::arbiter::{ArbiterEvent, ArbiterRunner};
use crate::broker::{BrokerBridge, BrokerConnector};
use crate::config::{AppConfig, BrokerConfig};
use crate::conversation::ConversationHandler;
use crate::queue::{IngestionQueue, QueueSender};
use crate::recognition::RecognitionEngineFactory;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use handle::{channel, CoordinatorHandle, ResponseGuard};
pub use state::{new_shared_state, ConversationState, SharedState};

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Owns the three background tasks.  Must be started inside a tokio
/// runtime.
pub struct Coordinator {
    handle: CoordinatorHandle,
    queue: QueueSender,
    broker_settings: watch::Sender<BrokerConfig>,
    arbiter_task: JoinHandle<()>,
    queue_task: JoinHandle<()>,
    bridge_task: JoinHandle<()>,
}

impl Coordinator {
    /// Spawn the arbiter runner, the ingestion queue and the broker bridge.
    ///
    /// `handle` and `events` come from [`channel`]; creating them first lets
    /// the conversation handler hold a handle for
    /// [`begin_response`](CoordinatorHandle::begin_response).
    pub fn start(
        (handle, events): (CoordinatorHandle, UnboundedReceiver<ArbiterEvent>),
        config: &AppConfig,
        engines: &dyn RecognitionEngineFactory,
        connector: Arc<dyn BrokerConnector>,
        handler: Arc<dyn ConversationHandler>,
    ) -> Self {
        let runner = ArbiterRunner::new(
            config,
            engines,
            Arc::clone(&handler),
            Arc::clone(handle.state()),
        );
        let arbiter_task = tokio::spawn(runner.run(events));

        let (queue, sender) = IngestionQueue::new(handler);
        let queue_task = tokio::spawn(queue.run());

        let (broker_settings, settings_rx) = watch::channel(config.broker.clone());
        let bridge = BrokerBridge::new(connector, settings_rx, handle.clone(), sender.clone());
        let bridge_task = tokio::spawn(bridge.run());

        log::info!("coordinator: started (lang={})", config.recognition.language);

        Self {
            handle,
            queue: sender,
            broker_settings,
            arbiter_task,
            queue_task,
            bridge_task,
        }
    }

    pub fn handle(&self) -> &CoordinatorHandle {
        &self.handle
    }

    /// Producer side of the ingestion queue, for hosts with their own
    /// message sources.
    pub fn queue(&self) -> &QueueSender {
        &self.queue
    }

    /// Apply new broker settings.  The bridge reconnects only when the
    /// enabled flag, the URL or the topic changed.
    pub fn update_broker(&self, config: BrokerConfig) {
        self.broker_settings.send_replace(config);
    }

    /// Stop listening, close the broker connection and wait for queued
    /// envelopes and finalized transcripts to be delivered.
    pub async fn shutdown(self) {
        let Self {
            handle,
            queue,
            broker_settings,
            arbiter_task,
            queue_task,
            bridge_task,
        } = self;

        handle.shutdown();
        drop(broker_settings);
        if let Err(e) = bridge_task.await {
            log::warn!("coordinator: broker bridge task failed: {e}");
        }
        drop(queue);
        if let Err(e) = queue_task.await {
            log::warn!("coordinator: ingestion queue task failed: {e}");
        }
        if let Err(e) = arbiter_task.await {
            log::warn!("coordinator: arbiter task failed: {e}");
        }
        log::info!("coordinator: stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::broker::LoopbackBroker;
    use crate::conversation::tests::RecordingHandler;
    use crate::recognition::{MockEngineFactory, RecognitionSignal};

    fn broker_config() -> BrokerConfig {
        BrokerConfig {
            enabled: true,
            url: "loopback://local".into(),
            topic: "chat".into(),
            ..Default::default()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn broker_commands_drive_recognition() {
        let broker = LoopbackBroker::new();
        let (engines, engine) = MockEngineFactory::new();
        let recorder = RecordingHandler::default();
        let config = AppConfig {
            broker: broker_config(),
            ..Default::default()
        };
        let coordinator = Coordinator::start(
            channel(),
            &config,
            &engines,
            Arc::new(broker.connector()),
            Arc::new(recorder.clone()),
        );
        settle().await;

        broker.publish("chat", "start_conversation");
        settle().await;
        assert!(coordinator.handle().snapshot().is_listening);
        assert_eq!(engine.start_calls(), 1);

        engine.emit(RecognitionSignal::FinalResult {
            text: "good morning".into(),
        });
        engine.emit(RecognitionSignal::Ended);
        settle().await;
        broker.publish("chat", r#"{"text":"Good morning!","role":"assistant"}"#);
        settle().await;

        assert_eq!(recorder.texts(), vec!["good morning", "Good morning!"]);

        broker.publish("chat", "stop_conversation");
        settle().await;
        let st = coordinator.handle().snapshot();
        assert!(!st.auto_recognition);
        assert!(!st.is_listening);

        coordinator.shutdown().await;
        assert!(broker.live_clients().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn broker_settings_can_be_changed_at_runtime() {
        let broker = LoopbackBroker::new();
        let (engines, _engine) = MockEngineFactory::new();
        let coordinator = Coordinator::start(
            channel(),
            &AppConfig::default(),
            &engines,
            Arc::new(broker.connector()),
            Arc::new(RecordingHandler::default()),
        );
        settle().await;
        assert!(broker.connection_history().is_empty());

        coordinator.update_broker(broker_config());
        settle().await;
        assert_eq!(broker.live_clients().len(), 1);

        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_last_transcript() {
        let broker = LoopbackBroker::new();
        let (engines, engine) = MockEngineFactory::new();
        let recorder = RecordingHandler::slow(Duration::from_millis(400));
        let coordinator = Coordinator::start(
            channel(),
            &AppConfig::default(),
            &engines,
            Arc::new(broker.connector()),
            Arc::new(recorder.clone()),
        );
        coordinator.handle().toggle_mic();
        settle().await;

        engine.emit(RecognitionSignal::FinalResult {
            text: "see you".into(),
        });
        settle().await;
        coordinator.shutdown().await;

        assert_eq!(recorder.texts(), vec!["see you"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_queued_envelopes() {
        let broker = LoopbackBroker::new();
        let (engines, _engine) = MockEngineFactory::new();
        let recorder = RecordingHandler::default();
        let coordinator = Coordinator::start(
            channel(),
            &AppConfig::default(),
            &engines,
            Arc::new(broker.connector()),
            Arc::new(recorder.clone()),
        );

        for text in ["one", "two"] {
            coordinator.queue().push(crate::broker::MessageEnvelope::fallback(text));
        }
        coordinator.shutdown().await;

        assert_eq!(recorder.texts(), vec!["one", "two"]);
    }
}
