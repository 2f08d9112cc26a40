//! Text box and mic button model.
//!
//! [`InputSurface`] holds what a front end needs to render the input row
//! and turns its clicks into coordinator requests.  Rendering itself is up
//! to the host; the demo host drives it from stdin.

use std::sync::Arc;

use crate::conversation::{ConversationHandler, Role};
use crate::coordinator::CoordinatorHandle;

pub struct InputSurface {
    handle: CoordinatorHandle,
    handler: Arc<dyn ConversationHandler>,
    draft: String,
    /// `draft` currently shows the live transcript rather than typed text.
    showing_live: bool,
    mic_recording: bool,
    mic_available: bool,
    busy: bool,
}

impl InputSurface {
    pub fn new(handle: CoordinatorHandle, handler: Arc<dyn ConversationHandler>) -> Self {
        Self {
            handle,
            handler,
            draft: String::new(),
            showing_live: false,
            mic_recording: false,
            mic_available: true,
            busy: false,
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Mic indicator.
    pub fn is_mic_recording(&self) -> bool {
        self.mic_recording
    }

    /// `false` once the runner has reported that the host has no speech
    /// recogniser; the mic button should render disabled.
    pub fn is_mic_available(&self) -> bool {
        self.mic_available
    }

    /// Input is disabled while the assistant is responding.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn on_text_changed(&mut self, text: impl Into<String>) {
        self.draft = text.into();
        self.showing_live = false;
    }

    pub fn on_mic_clicked(&self) {
        if !self.mic_available {
            log::debug!("input: mic click ignored, no speech recogniser");
            return;
        }
        self.handle.toggle_mic();
    }

    /// The trimmed draft, if any; clears the draft.
    pub fn take_message(&mut self) -> Option<String> {
        let text = self.draft.trim().to_string();
        if text.is_empty() {
            return None;
        }
        self.draft.clear();
        self.showing_live = false;
        Some(text)
    }

    /// Send the draft as a user utterance.  Returns `false` when nothing was
    /// sent (empty draft or assistant busy).
    pub async fn submit(&mut self) -> bool {
        if self.busy {
            log::debug!("input: submit ignored while the assistant is responding");
            return false;
        }
        let Some(text) = self.take_message() else {
            return false;
        };
        self.handler.deliver(text, Some(Role::User), None).await;
        true
    }

    /// Pull the mic indicators, busy flag and live transcript from the
    /// shared state.  Call once per render.
    pub fn sync(&mut self) {
        let st = self.handle.snapshot();
        self.mic_recording = st.is_listening;
        self.mic_available = st.recognition_available;
        self.busy = st.is_busy();

        if !st.live_transcript.is_empty() {
            self.draft = st.live_transcript;
            self.showing_live = true;
        } else if self.showing_live {
            self.draft.clear();
            self.showing_live = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
