//! Broker payload decoding.
//!
//! Every payload is one of three things, tried in this order:
//!
//! 1. a JSON object decoding to a [`MessageEnvelope`];
//! 2. a [`ControlCommand`] literal;
//! 3. plain text, wrapped by [`MessageEnvelope::fallback`].
//!
//! Classification never fails; a payload that is neither JSON nor a command
//! is still delivered as an assistant line.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::command::ControlCommand;
use crate::conversation::Role;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("payload is not a message envelope: {0}")]
    Decode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// MessageEnvelope
// ---------------------------------------------------------------------------

/// A chat line received from the broker.
///
/// Only `text` is required.  A `role` that is missing, `null` or not a
/// string means the assistant; non-string `emotion` / `state` are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub text: String,
    #[serde(default = "default_role", deserialize_with = "lenient_role")]
    pub role: Role,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub emotion: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<String>,
}

fn default_role() -> Role {
    Role::Assistant
}

fn lenient_role<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Role, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(role) => Role::from(role),
        _ => default_role(),
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

impl MessageEnvelope {
    /// Decode a JSON envelope.  Fields are taken verbatim.
    pub fn decode(payload: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Envelope for a payload that is not JSON: spoken by the assistant,
    /// neutral, ending its turn.
    pub fn fallback(raw: impl Into<String>) -> Self {
        Self {
            text: raw.into(),
            role: Role::Assistant,
            emotion: Some("neutral".into()),
            state: Some("end".into()),
        }
    }

    /// Collapse code-interpreter roles into [`Role::Code`].
    pub fn normalize_role(mut self) -> Self {
        self.role = self.role.normalized();
        self
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Result of classifying one broker payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command(ControlCommand),
    Envelope(MessageEnvelope),
}

/// Classify a raw payload.  Invalid UTF-8 is replaced, not rejected.
pub fn classify(payload: &[u8]) -> Inbound {
    let text = String::from_utf8_lossy(payload);

    match MessageEnvelope::decode(&text) {
        Ok(envelope) => return Inbound::Envelope(envelope),
        Err(e) => log::debug!("broker: {e}"),
    }

    match ControlCommand::parse(&text) {
        Some(command) => Inbound::Command(command),
        None => Inbound::Envelope(MessageEnvelope::fallback(text)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_envelope_fields_are_taken_verbatim() {
        let inbound = classify(br#"{"text":"hi","role":"user","emotion":"happy","state":"start"}"#);
        assert_eq!(
            inbound,
            Inbound::Envelope(MessageEnvelope {
                text: "hi".into(),
                role: Role::User,
                emotion: Some("happy".into()),
                state: Some("start".into()),
            })
        );
    }

    #[test]
    fn missing_role_defaults_to_assistant() {
        let env = MessageEnvelope::decode(r#"{"text":"x"}"#).unwrap();
        assert_eq!(env.role, Role::Assistant);
        assert_eq!(env.emotion, None);
        assert_eq!(env.state, None);
    }

    #[test]
    fn null_or_non_string_role_means_assistant() {
        let inbound = classify(br#"{"text":"x","role":null,"state":"mid"}"#);
        assert_eq!(
            inbound,
            Inbound::Envelope(MessageEnvelope {
                text: "x".into(),
                role: Role::Assistant,
                emotion: None,
                state: Some("mid".into()),
            })
        );

        let env = MessageEnvelope::decode(r#"{"text":"y","role":7,"emotion":{"a":1}}"#).unwrap();
        assert_eq!(env.role, Role::Assistant);
        assert_eq!(env.emotion, None);
    }

    #[test]
    fn unknown_role_is_preserved() {
        let env = MessageEnvelope::decode(r#"{"text":"x","role":"narrator"}"#).unwrap();
        assert_eq!(env.role, Role::Other("narrator".into()));
        assert_eq!(env.normalize_role().role, Role::Other("narrator".into()));
    }

    #[test]
    fn code_roles_normalize() {
        let env = MessageEnvelope::decode(r#"{"text":"ls","role":"executing"}"#).unwrap();
        assert_eq!(env.normalize_role().role, Role::Code);
    }

    #[test]
    fn control_literal_is_a_command() {
        assert_eq!(classify(b"wake"), Inbound::Command(ControlCommand::Wake));
        assert_eq!(
            classify(b"  stop_conversation\n"),
            Inbound::Command(ControlCommand::StopConversation)
        );
    }

    #[test]
    fn plain_text_falls_back() {
        assert_eq!(
            classify(b"hello world"),
            Inbound::Envelope(MessageEnvelope {
                text: "hello world".into(),
                role: Role::Assistant,
                emotion: Some("neutral".into()),
                state: Some("end".into()),
            })
        );
    }

    #[test]
    fn json_without_text_falls_back_to_raw_payload() {
        let raw = r#"{"message":"hi"}"#;
        assert_eq!(
            classify(raw.as_bytes()),
            Inbound::Envelope(MessageEnvelope::fallback(raw))
        );
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let Inbound::Envelope(env) = classify(&[b'o', b'k', 0xff]) else {
            panic!("expected envelope");
        };
        assert_eq!(env.text, "ok\u{fffd}");
    }

    #[test]
    fn decode_error_is_reported() {
        let err = MessageEnvelope::decode("not json").unwrap_err();
        assert!(err.to_string().starts_with("payload is not a message envelope"));
    }
}
