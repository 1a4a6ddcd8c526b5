//! Stream events
//!
//! Decodes the text payloads carried by the channel into [`StreamEvent`]s.
//!
//! Wire format (one JSON object per payload):
//!
//! ```json
//! {"type": "message_chunk", "messageId": "m1", "content": "Hello "}
//! {"type": "message_complete", "messageId": "m1"}
//! {"type": "error", "error": "assistant backend unavailable"}
//! {"type": "connection", "content": "ready"}
//! {"type": "heartbeat"}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{StreamError, StreamResult};

const DEFAULT_ERROR_DESCRIPTION: &str = "server error";

/// The atomic unit received over a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Fragment of assistant text to append to `message_id`
    #[serde(rename = "message_chunk")]
    Chunk {
        #[serde(rename = "messageId")]
        message_id: String,
        content: String,
    },
    /// Content of `message_id` is final
    #[serde(rename = "message_complete")]
    Complete {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    /// The producer failed for the current turn
    Error {
        #[serde(rename = "error")]
        description: String,
    },
    /// Channel opened; informational
    Connection {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    /// Liveness signal; never shown in the message log
    Heartbeat,
}

impl StreamEvent {
    pub fn chunk(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Chunk {
            message_id: message_id.into(),
            content: content.into(),
        }
    }

    pub fn complete(message_id: impl Into<String>) -> Self {
        Self::Complete {
            message_id: message_id.into(),
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self::Error {
            description: description.into(),
        }
    }

    /// Decode a single channel payload
    pub fn parse(payload: &str) -> StreamResult<Self> {
        let wire: WireEvent = serde_json::from_str(payload)
            .map_err(|e| StreamError::parse(e.to_string(), payload))?;
        wire.into_event(payload)
    }

    /// Encode as a channel payload
    pub fn to_payload(&self) -> String {
        // Serializing a plain enum of strings cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Message identifier, for `chunk` and `complete`
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Chunk { message_id, .. } | Self::Complete { message_id } => Some(message_id),
            _ => None,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }

    /// Wire tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "message_chunk",
            Self::Complete { .. } => "message_complete",
            Self::Error { .. } => "error",
            Self::Connection { .. } => "connection",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// Loose shape of a payload before variant validation
#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "messageId", alias = "message_id")]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl WireEvent {
    fn into_event(self, payload: &str) -> StreamResult<StreamEvent> {
        match self.kind.as_str() {
            "message_chunk" | "chunk" => Ok(StreamEvent::Chunk {
                message_id: require_id(self.message_id, payload)?,
                content: self.content.unwrap_or_default(),
            }),
            "message_complete" | "complete" => Ok(StreamEvent::Complete {
                message_id: require_id(self.message_id, payload)?,
            }),
            "error" => Ok(StreamEvent::Error {
                description: self
                    .error
                    .or(self.message)
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| DEFAULT_ERROR_DESCRIPTION.to_string()),
            }),
            "connection" => Ok(StreamEvent::Connection {
                content: self.content,
            }),
            "heartbeat" => Ok(StreamEvent::Heartbeat),
            other => Err(StreamError::parse(
                format!("unknown event type '{}'", other),
                payload,
            )),
        }
    }
}

fn require_id(id: Option<String>, payload: &str) -> StreamResult<String> {
    id.filter(|id| !id.is_empty())
        .ok_or_else(|| StreamError::parse("event is missing messageId", payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_chunk() {
        let event =
            StreamEvent::parse(r#"{"type":"message_chunk","messageId":"m1","content":"Hi"}"#)
                .unwrap();
        assert_eq!(event, StreamEvent::chunk("m1", "Hi"));
    }

    #[test]
    fn test_parse_snake_case_id_and_short_tags() {
        let event =
            StreamEvent::parse(r#"{"type":"chunk","message_id":"m2","content":"x"}"#).unwrap();
        assert_eq!(event, StreamEvent::chunk("m2", "x"));

        let event = StreamEvent::parse(r#"{"type":"complete","messageId":"m2"}"#).unwrap();
        assert_eq!(event, StreamEvent::complete("m2"));
    }

    #[test]
    fn test_parse_chunk_without_content() {
        let event = StreamEvent::parse(r#"{"type":"message_chunk","messageId":"m1"}"#).unwrap();
        assert_eq!(event, StreamEvent::chunk("m1", ""));
    }

    #[test]
    fn test_parse_error_description_fallbacks() {
        let event = StreamEvent::parse(r#"{"type":"error","error":"backend down"}"#).unwrap();
        assert_eq!(event, StreamEvent::error("backend down"));

        let event = StreamEvent::parse(r#"{"type":"error","message":"quota"}"#).unwrap();
        assert_eq!(event, StreamEvent::error("quota"));

        let event = StreamEvent::parse(r#"{"type":"error"}"#).unwrap();
        assert_eq!(event, StreamEvent::error("server error"));
    }

    #[test]
    fn test_parse_informational() {
        assert_eq!(
            StreamEvent::parse(r#"{"type":"heartbeat","data":{"ts":1}}"#).unwrap(),
            StreamEvent::Heartbeat
        );
        assert_eq!(
            StreamEvent::parse(r#"{"type":"connection","content":"ok"}"#).unwrap(),
            StreamEvent::Connection {
                content: Some("ok".to_string())
            }
        );
    }

    #[test]
    fn test_parse_failures() {
        let err = StreamEvent::parse("not json").unwrap_err();
        assert!(matches!(err, StreamError::Parse { ref payload, .. } if payload == "not json"));

        let err = StreamEvent::parse(r#"{"type":"typing"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown event type 'typing'"));

        let err = StreamEvent::parse(r#"{"type":"message_complete"}"#).unwrap_err();
        assert!(err.to_string().contains("missing messageId"));
    }

    #[test]
    fn test_to_payload_shape() {
        let payload = StreamEvent::chunk("m1", "Hi").to_payload();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "message_chunk", "messageId": "m1", "content": "Hi"})
        );
    }
}
