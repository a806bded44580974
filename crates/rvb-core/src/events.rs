//! Inbound gateway events.
//!
//! Revolt frames are JSON objects tagged by `"type"`. We only decode the
//! fields we act on and keep the full payload around for logging and for the
//! console environment.

use serde::Deserialize;
use serde_json::Value;

use crate::{
    domain::{ChannelId, MessageId, UserId},
    Result,
};

/// A message-created event.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IncomingMessage {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub channel: ChannelId,
    pub author: UserId,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Authenticated,
    Ready,
    Message(IncomingMessage),
    ChannelStartTyping,
    ChannelStopTyping,
    UserUpdate,
    Pong,
    /// Server-side error frame, e.g. `InvalidSession`.
    Error(String),
    /// Anything we do not model explicitly, keyed by its `type` tag.
    Other(String),
}

#[derive(Clone, Debug)]
pub struct GatewayEvent {
    pub kind: EventKind,
    pub raw: Value,
}

impl GatewayEvent {
    /// Decode one websocket text frame. `Bulk` frames expand into their items.
    pub fn parse(text: &str) -> Result<Vec<Self>> {
        let raw: Value = serde_json::from_str(text)?;
        let mut out = Vec::new();
        Self::flatten(raw, &mut out);
        Ok(out)
    }

    fn flatten(raw: Value, out: &mut Vec<Self>) {
        if type_tag(&raw) == "Bulk" {
            if let Some(Value::Array(items)) = raw.get("v") {
                for item in items.clone() {
                    Self::flatten(item, out);
                }
            }
            return;
        }
        out.push(Self::from_value(raw));
    }

    pub fn from_value(raw: Value) -> Self {
        let tag = type_tag(&raw).to_string();
        let kind = match tag.as_str() {
            "Authenticated" => EventKind::Authenticated,
            "Ready" => EventKind::Ready,
            "Message" => match serde_json::from_value::<IncomingMessage>(raw.clone()) {
                Ok(m) => EventKind::Message(m),
                Err(_) => EventKind::Other(tag),
            },
            "ChannelStartTyping" => EventKind::ChannelStartTyping,
            "ChannelStopTyping" => EventKind::ChannelStopTyping,
            "UserUpdate" => EventKind::UserUpdate,
            "Pong" => EventKind::Pong,
            "Error" => EventKind::Error(
                raw.get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
            ),
            _ => EventKind::Other(tag),
        };
        Self { kind, raw }
    }

    /// High-frequency kinds that are not worth dumping to the log.
    pub fn is_noisy(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ChannelStartTyping | EventKind::ChannelStopTyping | EventKind::UserUpdate
        )
    }

    pub fn type_name(&self) -> &str {
        type_tag(&self.raw)
    }
}

fn type_tag(raw: &Value) -> &str {
    raw.get("type").and_then(|t| t.as_str()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_event() {
        let evs = GatewayEvent::parse(
            r#"{"type":"Message","_id":"01M","channel":"01C","author":"01A","content":"!ping"}"#,
        )
        .unwrap();
        assert_eq!(evs.len(), 1);
        let EventKind::Message(m) = &evs[0].kind else {
            panic!("expected message, got {:?}", evs[0].kind);
        };
        assert_eq!(m.channel, ChannelId("01C".to_string()));
        assert_eq!(m.author, UserId("01A".to_string()));
        assert_eq!(m.content.as_deref(), Some("!ping"));
        assert_eq!(evs[0].type_name(), "Message");
    }

    #[test]
    fn message_without_content_is_still_a_message() {
        let evs =
            GatewayEvent::parse(r#"{"type":"Message","_id":"1","channel":"2","author":"3"}"#)
                .unwrap();
        assert!(matches!(&evs[0].kind, EventKind::Message(m) if m.content.is_none()));
    }

    #[test]
    fn flattens_bulk_frames() {
        let evs = GatewayEvent::parse(
            r#"{"type":"Bulk","v":[
                {"type":"Ready"},
                {"type":"ChannelStartTyping","id":"c","user":"u"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(evs.len(), 2);
        assert_eq!(evs[0].kind, EventKind::Ready);
        assert!(evs[1].is_noisy());
    }

    #[test]
    fn classifies_noise_and_errors() {
        let typing = GatewayEvent::from_value(serde_json::json!({"type":"ChannelStopTyping"}));
        let update = GatewayEvent::from_value(serde_json::json!({"type":"UserUpdate"}));
        let ready = GatewayEvent::from_value(serde_json::json!({"type":"Ready"}));
        assert!(typing.is_noisy());
        assert!(update.is_noisy());
        assert!(!ready.is_noisy());

        let err = GatewayEvent::from_value(
            serde_json::json!({"type":"Error","error":"InvalidSession"}),
        );
        assert_eq!(err.kind, EventKind::Error("InvalidSession".to_string()));

        let other = GatewayEvent::from_value(serde_json::json!({"type":"ServerCreate"}));
        assert_eq!(other.kind, EventKind::Other("ServerCreate".to_string()));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(GatewayEvent::parse("not json").is_err());
    }
}
