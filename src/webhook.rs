//! Inbound message envelopes
//!
//! Providers wrap a chat message in different JSON shapes. Only the sender
//! handle and the text are needed; everything else is ignored.

use crate::error::BotError;
use crate::messaging::normalize_handle;
use crate::Result;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Normalized chat handle of the sender
    pub sender: String,
    pub text: String,
}

const SENDER_KEYS: &[&str] = &["sender_id", "sender", "from", "phone"];

fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get("text")
            .or_else(|| map.get("conversation"))
            .or_else(|| map.get("body"))
            .and_then(Value::as_str),
        _ => None,
    }
}

fn sender_of(payload: &Value) -> Option<String> {
    SENDER_KEYS.iter().find_map(|key| match payload.get(*key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl InboundMessage {
    pub fn from_envelope(payload: &Value) -> Result<Self> {
        let text = payload
            .get("message")
            .and_then(text_of)
            .or_else(|| payload.get("text").and_then(Value::as_str))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BotError::invalid("envelope has no message text"))?;

        let sender = sender_of(payload)
            .map(|s| normalize_handle(&s))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BotError::invalid("envelope has no sender"))?;

        Ok(Self {
            sender,
            text: text.to_string(),
        })
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let payload: Value = serde_json::from_str(raw)?;
        Self::from_envelope(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_message_text() {
        let msg = InboundMessage::from_envelope(&json!({
            "sender_id": "628123456@s.whatsapp.net",
            "message": {"id": "ABC", "text": " /my_tasks "}
        }))
        .unwrap();
        assert_eq!(msg.sender, "628123456");
        assert_eq!(msg.text, "/my_tasks");
    }

    #[test]
    fn test_flat_shapes() {
        let msg = InboundMessage::parse(r#"{"from": "08123456", "message": "halo"}"#).unwrap();
        assert_eq!(msg.sender, "628123456");
        assert_eq!(msg.text, "halo");

        let msg = InboundMessage::parse(r#"{"phone": 628111, "text": "hi"}"#).unwrap();
        assert_eq!(msg.sender, "628111");
    }

    #[test]
    fn test_incomplete_envelopes_are_rejected() {
        assert!(InboundMessage::parse(r#"{"sender_id": "628"}"#).is_err());
        assert!(InboundMessage::parse(r#"{"message": {"text": "hi"}}"#).is_err());
        assert!(InboundMessage::parse("not json").is_err());
    }
}
