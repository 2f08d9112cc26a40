//! System-wide push-to-talk listener using `rdev::listen`.
//!
//! `rdev::listen` blocks for the life of the process, so it runs on its own
//! OS thread.  Dropping the [`KeyListener`] sets a stop flag; the thread
//! stays parked inside rdev but forwards nothing more.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use thiserror::Error;

use super::{parse_key, parse_modifier, KeyHoldTrigger, KeyIntent};
use crate::config::HotkeyConfig;
use crate::coordinator::CoordinatorHandle;

#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("unknown push-to-talk key {0:?}")]
    UnknownKey(String),

    #[error("unknown modifier {0:?}")]
    UnknownModifier(String),

    #[error("failed to spawn key listener thread: {0}")]
    Spawn(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// KeyListener
// ---------------------------------------------------------------------------

pub struct KeyListener {
    stop: Arc<AtomicBool>,
    /// Never joined: `rdev::listen` does not return.
    _thread: std::thread::JoinHandle<()>,
}

impl KeyListener {
    /// Start forwarding the configured chord to `handle` as key-down /
    /// key-up requests.
    pub fn start(config: &HotkeyConfig, handle: CoordinatorHandle) -> Result<Self, HotkeyError> {
        let key = parse_key(&config.push_to_talk_key)
            .ok_or_else(|| HotkeyError::UnknownKey(config.push_to_talk_key.clone()))?;
        let modifiers = parse_modifier(&config.modifier)
            .ok_or_else(|| HotkeyError::UnknownModifier(config.modifier.clone()))?;
        let mut trigger = KeyHoldTrigger::new(key, modifiers);

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("key-listener".into())
            .spawn(move || {
                let result = rdev::listen(move |event| {
                    if stop_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    let intent = match event.event_type {
                        rdev::EventType::KeyPress(k) => trigger.on_press(k),
                        rdev::EventType::KeyRelease(k) => trigger.on_release(k),
                        _ => None,
                    };
                    match intent {
                        Some(KeyIntent::StartListening) => handle.key_down(),
                        Some(KeyIntent::SendIfHeld) => handle.key_up(),
                        None => {}
                    }
                });

                if let Err(e) = result {
                    log::error!("key-listener: rdev::listen exited with error: {e:?}");
                }
            })?;

        log::info!(
            "key-listener: push-to-talk on {}+{}",
            config.modifier,
            config.push_to_talk_key
        );
        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
