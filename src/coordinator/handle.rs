//! [`CoordinatorHandle`]: the write path into the arbiter.

use tokio::sync::mpsc;

use super::state::{new_shared_state, ConversationState, SharedState};
use crate::arbiter::ArbiterEvent;
use crate::broker::ControlCommand;

/// Create a handle plus the receiving end the arbiter runner consumes.
pub fn channel() -> (CoordinatorHandle, mpsc::UnboundedReceiver<ArbiterEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = CoordinatorHandle {
        state: new_shared_state(),
        events: tx,
    };
    (handle, rx)
}

// ---------------------------------------------------------------------------
// CoordinatorHandle
// ---------------------------------------------------------------------------

/// Cheap-to-clone handle used by every producer of user intent: the input
/// surface, the key listener, the broker bridge and the response pipeline.
///
/// Request fields of [`ConversationState`] are written here, under the lock,
/// before the matching [`ArbiterEvent`] is sent, so observers never see an
/// event whose request is not yet recorded.
#[derive(Clone)]
pub struct CoordinatorHandle {
    state: SharedState,
    events: mpsc::UnboundedSender<ArbiterEvent>,
}

impl CoordinatorHandle {
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Copy of the current shared state.
    pub fn snapshot(&self) -> ConversationState {
        self.state.lock().unwrap().clone()
    }

    pub fn toggle_mic(&self) {
        self.send(ArbiterEvent::ManualToggle);
    }

    pub fn set_auto_recognition(&self, enabled: bool) {
        let mut st = self.state.lock().unwrap();
        st.auto_recognition = enabled;
        self.send(ArbiterEvent::AutoModeChanged(enabled));
    }

    /// One-shot wake.  Consumed once the assistant is not responding.
    pub fn request_wake(&self) {
        let mut st = self.state.lock().unwrap();
        st.wake_requested = true;
        self.send(ArbiterEvent::OneShotTrigger);
    }

    pub fn key_down(&self) {
        self.send(ArbiterEvent::KeyDown);
    }

    pub fn key_up(&self) {
        self.send(ArbiterEvent::KeyUp);
    }

    pub fn apply_command(&self, command: ControlCommand) {
        log::info!("coordinator: control command {}", command.as_str());
        match command {
            ControlCommand::StartConversation => self.set_auto_recognition(true),
            ControlCommand::StopConversation => self.set_auto_recognition(false),
            ControlCommand::Wake => self.request_wake(),
        }
    }

    /// Mark an assistant response as in flight until the guard is dropped.
    ///
    /// Recognition is stopped as soon as the first guard exists and is only
    /// allowed to resume once the last one is gone.
    pub fn begin_response(&self) -> ResponseGuard {
        let mut st = self.state.lock().unwrap();
        st.active_responses += 1;
        self.send(ArbiterEvent::BusyCountChanged(st.active_responses));
        ResponseGuard {
            handle: self.clone(),
        }
    }

    /// Ask the arbiter runner to stop the session and exit.
    pub fn shutdown(&self) {
        self.send(ArbiterEvent::Shutdown);
    }

    fn send(&self, event: ArbiterEvent) {
        if self.events.send(event).is_err() {
            log::debug!("coordinator: arbiter runner gone, event dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// ResponseGuard
// ---------------------------------------------------------------------------

/// Keeps `active_responses` raised for as long as it lives.
#[must_use = "the response is considered finished as soon as the guard is dropped"]
pub struct ResponseGuard {
    handle: CoordinatorHandle,
}

impl Drop for ResponseGuard {
    fn drop(&mut self) {
        let Ok(mut st) = self.handle.state.lock() else {
            return;
        };
        st.active_responses = st.active_responses.saturating_sub(1);
        self.handle
            .send(ArbiterEvent::BusyCountChanged(st.active_responses));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
