//! Downstream conversation handler interface.
//!
//! Everything the coordinator produces (typed text, recognised speech and
//! broker envelopes) ends up in a single [`ConversationHandler::deliver`]
//! call.  The handler itself (chat completion, TTS, rendering) lives outside
//! this crate.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Speaker role attached to a delivered message.
///
/// Broker payloads may carry roles this crate does not know about; they are
/// kept verbatim in [`Role::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
    /// Output of code execution, after normalisation.
    Code,
    /// Raw code-interpreter stdout.
    Output,
    /// Code-interpreter "currently running" notices.
    Executing,
    /// Code-interpreter console lines.
    Console,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Code => "code",
            Role::Output => "output",
            Role::Executing => "executing",
            Role::Console => "console",
            Role::Other(s) => s,
        }
    }

    /// Code-interpreter roles that the conversation handler only knows as
    /// [`Role::Code`].
    pub fn is_code_execution(&self) -> bool {
        matches!(self, Role::Output | Role::Executing | Role::Console)
    }

    /// Collapse code-interpreter roles into [`Role::Code`].
    ///
    /// ```
    /// use voice_intake::conversation::Role;
    ///
    /// assert_eq!(Role::Executing.normalized(), Role::Code);
    /// assert_eq!(Role::User.normalized(), Role::User);
    /// ```
    pub fn normalized(self) -> Role {
        if self.is_code_execution() {
            Role::Code
        } else {
            self
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "code" => Role::Code,
            "output" => Role::Output,
            "executing" => Role::Executing,
            "console" => Role::Console,
            _ => Role::Other(s),
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Role::from(s.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ConversationHandler
// ---------------------------------------------------------------------------

/// Consumer of finalized utterances.
///
/// Implementations must be `Send + Sync` so they can be shared as
/// `Arc<dyn ConversationHandler>` between the recognition runner, the
/// ingestion queue and the input surface.  `deliver` must not fail for
/// well-formed input; the ingestion queue awaits it before handing over the
/// next envelope.
#[async_trait]
pub trait ConversationHandler: Send + Sync {
    async fn deliver(&self, text: String, role: Option<Role>, state: Option<String>);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// A delivered `(text, role, state)` triple.
    pub(crate) type Delivered = (String, Option<Role>, Option<String>);

    /// Records every delivery in order.
    #[derive(Default, Clone)]
    pub(crate) struct RecordingHandler {
        pub(crate) delivered: Arc<Mutex<Vec<Delivered>>>,
        /// Time spent in `deliver` before recording.
        delay: Duration,
    }

    impl RecordingHandler {
        pub(crate) fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        pub(crate) fn texts(&self) -> Vec<String> {
            self.delivered
                .lock()
                .unwrap()
                .iter()
                .map(|(t, _, _)| t.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ConversationHandler for RecordingHandler {
        async fn deliver(&self, text: String, role: Option<Role>, state: Option<String>) {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.delivered.lock().unwrap().push((text, role, state));
        }
    }

    #[test]
    fn known_roles_parse() {
        assert_eq!(Role::from("user"), Role::User);
        assert_eq!(Role::from("assistant"), Role::Assistant);
        assert_eq!(Role::from("console"), Role::Console);
    }

    #[test]
    fn unknown_roles_are_preserved() {
        let role = Role::from("narrator");
        assert_eq!(role, Role::Other("narrator".into()));
        assert_eq!(role.as_str(), "narrator");
        assert_eq!(String::from(role), "narrator");
    }

    #[test]
    fn code_execution_roles_normalize_to_code() {
        for raw in ["output", "executing", "console"] {
            assert_eq!(Role::from(raw).normalized(), Role::Code, "{raw}");
        }
        assert_eq!(Role::Assistant.normalized(), Role::Assistant);
        assert_eq!(Role::Code.normalized(), Role::Code);
    }

    #[test]
    fn role_serializes_as_plain_string() {
        let json = serde_json::to_string(&Role::Executing).unwrap();
        assert_eq!(json, "\"executing\"");
        let back: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(back, Role::System);
    }
}
