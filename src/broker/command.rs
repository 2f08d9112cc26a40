//! Control literals accepted on the broker topic.

/// Commands a broker publisher can issue instead of a chat line.
///
/// Commands are applied directly to the coordinator and never reach the
/// ingestion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Turn auto-recognition on.
    StartConversation,
    /// Turn auto-recognition off.
    StopConversation,
    /// Listen for exactly one utterance.
    Wake,
}

impl ControlCommand {
    /// Match a payload against the control literals.  Surrounding
    /// whitespace is ignored; case is not.
    ///
    /// ```
    /// use voice_intake::broker::ControlCommand;
    ///
    /// assert_eq!(ControlCommand::parse(" wake\n"), Some(ControlCommand::Wake));
    /// assert_eq!(ControlCommand::parse("Wake"), None);
    /// ```
    pub fn parse(payload: &str) -> Option<Self> {
        match payload.trim() {
            "start_conversation" => Some(ControlCommand::StartConversation),
            "stop_conversation" => Some(ControlCommand::StopConversation),
            "wake" => Some(ControlCommand::Wake),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::StartConversation => "start_conversation",
            ControlCommand::StopConversation => "stop_conversation",
            ControlCommand::Wake => "wake",
        }
    }
}
