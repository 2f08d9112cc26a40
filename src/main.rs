//! Console host for the voice intake coordinator.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (defaults on first run).
//! 3. Create the tokio runtime.
//! 4. Start the [`Coordinator`] with the in-process loopback broker and a
//!    console conversation handler.  A console has no speech recogniser, so
//!    recognition runs in its "unavailable" mode unless a platform engine is
//!    plugged in.
//! 5. With the `global-hotkey` feature, start the push-to-talk listener.
//! 6. Read commands from stdin until `/quit` or end of input.
//!
//! # Commands
//!
//! ```text
//! /mic               toggle the microphone
//! /auto on|off       auto-recognition mode
//! /wake              listen for one utterance
//! /publish <payload> publish on the configured broker topics
//! /quit              exit
//! anything else      sent as typed text
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use voice_intake::{
    broker::LoopbackBroker,
    config::AppConfig,
    conversation::{ConversationHandler, Role},
    coordinator::{self, Coordinator, CoordinatorHandle},
    input::InputSurface,
    recognition::UnavailableEngineFactory,
};

// ---------------------------------------------------------------------------
// ConsoleHandler
// ---------------------------------------------------------------------------

/// Prints every delivered line.  User lines get a short simulated reply,
/// during which recognition is paused.
struct ConsoleHandler {
    handle: CoordinatorHandle,
}

#[async_trait]
impl ConversationHandler for ConsoleHandler {
    async fn deliver(&self, text: String, role: Option<Role>, state: Option<String>) {
        let role = role.unwrap_or(Role::User);
        println!("[{role}] {text}");
        log::debug!("console: delivered with state {state:?}");

        if role == Role::User {
            let busy = self.handle.begin_response();
            let heard = text.chars().count();
            tokio::spawn(async move {
                let _busy = busy;
                tokio::time::sleep(Duration::from_millis(800)).await;
                println!("[assistant] heard {heard} characters");
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Command loop
// ---------------------------------------------------------------------------

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let broker = LoopbackBroker::new();
    let channel = coordinator::channel();
    let handle = channel.0.clone();
    let handler: Arc<dyn ConversationHandler> = Arc::new(ConsoleHandler {
        handle: handle.clone(),
    });

    let coordinator = Coordinator::start(
        channel,
        &config,
        &UnavailableEngineFactory::new("no speech engine on a console host"),
        Arc::new(broker.connector()),
        Arc::clone(&handler),
    );

    #[cfg(feature = "global-hotkey")]
    let _keys = match voice_intake::hotkey::KeyListener::start(&config.hotkey, handle.clone()) {
        Ok(listener) => Some(listener),
        Err(e) => {
            log::warn!("push-to-talk unavailable: {e}");
            None
        }
    };

    let mut input = InputSurface::new(handle.clone(), handler);
    let topics = config.broker.topics();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/mic", _) => {
                input.sync();
                if !input.is_mic_available() {
                    println!("(no speech recogniser on this host)");
                }
                input.on_mic_clicked();
            }
            ("/auto", "on") => handle.set_auto_recognition(true),
            ("/auto", "off") => handle.set_auto_recognition(false),
            ("/wake", _) => handle.request_wake(),
            ("/publish", payload) => {
                if topics.is_empty() {
                    log::warn!("no broker topic configured; nothing published");
                }
                for topic in &topics {
                    broker.publish(topic, payload);
                }
            }
            _ if line.starts_with('/') => println!("unknown command: {line}"),
            _ => {
                input.sync();
                input.on_text_changed(line);
                if !input.submit().await && input.is_busy() {
                    println!("(assistant is responding, try again shortly)");
                }
            }
        }
    }

    coordinator.shutdown().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice intake starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config))
}
