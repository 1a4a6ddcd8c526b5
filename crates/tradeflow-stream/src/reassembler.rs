//! Message Reassembler
//!
//! Folds [`StreamEvent`]s into mutations on a [`ChatMessage`] collection.
//! The reassembler never owns the collection: [`Reassembler::reassemble`]
//! reads it only to ask whether an id exists, and returns the delta to apply.
//!
//! Rules:
//! - `chunk(id, text)` creates an assistant message in `sending` state, or
//!   appends `text` verbatim to the existing one. Arrival order is authoritative.
//! - `complete(id)` marks an existing message `sent`. A `complete` for an
//!   unknown id is a no-op: no empty message is synthesized. Repeated
//!   `complete`s are idempotent.
//! - `error(description)` is surfaced as a turn error. Message status is left
//!   alone unless [`ErrorMode::MarkInFlight`] is selected.
//! - `heartbeat` and `connection` never touch the collection.

use crate::event::StreamEvent;
use crate::types::{ChatMessage, MessageStatus};

/// What an `error` event does to the message collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Report the error, leave every message as is
    #[default]
    Surface,
    /// Also mark in-flight assistant messages as `error`
    MarkInFlight,
}

/// A single proposed mutation of the message collection
#[derive(Debug, Clone, PartialEq)]
pub enum MessageDelta {
    Created(ChatMessage),
    Appended { id: String, text: String },
    Finalized { id: String },
    Failed { ids: Vec<String> },
}

impl MessageDelta {
    /// Apply this delta in place
    pub fn apply(&self, messages: &mut Vec<ChatMessage>) {
        match self {
            MessageDelta::Created(message) => messages.push(message.clone()),
            MessageDelta::Appended { id, text } => {
                if let Some(message) = find_mut(messages, id) {
                    message.content.push_str(text);
                }
            }
            MessageDelta::Finalized { id } => {
                if let Some(message) = find_mut(messages, id) {
                    message.status = MessageStatus::Sent;
                }
            }
            MessageDelta::Failed { ids } => {
                for message in messages.iter_mut().filter(|m| ids.contains(&m.id)) {
                    message.status = MessageStatus::Error;
                }
            }
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        match self {
            MessageDelta::Created(message) => Some(&message.id),
            MessageDelta::Appended { id, .. } | MessageDelta::Finalized { id } => Some(id),
            MessageDelta::Failed { .. } => None,
        }
    }
}

/// Result of reassembling one event
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reassembly {
    pub delta: Option<MessageDelta>,
    /// Description of a server-signaled turn failure
    pub turn_error: Option<String>,
}

impl Reassembly {
    fn delta(delta: MessageDelta) -> Self {
        Self {
            delta: Some(delta),
            turn_error: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.delta.is_none() && self.turn_error.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Reassembler {
    error_mode: ErrorMode,
}

impl Reassembler {
    pub fn new(error_mode: ErrorMode) -> Self {
        Self { error_mode }
    }

    /// Compute the mutation `event` proposes against `messages`
    pub fn reassemble(&self, messages: &[ChatMessage], event: &StreamEvent) -> Reassembly {
        match event {
            StreamEvent::Chunk {
                message_id,
                content,
            } => {
                if messages.iter().any(|m| &m.id == message_id) {
                    Reassembly::delta(MessageDelta::Appended {
                        id: message_id.clone(),
                        text: content.clone(),
                    })
                } else {
                    Reassembly::delta(MessageDelta::Created(ChatMessage::assistant(
                        message_id.clone(),
                        content.clone(),
                    )))
                }
            }
            StreamEvent::Complete { message_id } => {
                if messages.iter().any(|m| &m.id == message_id) {
                    Reassembly::delta(MessageDelta::Finalized {
                        id: message_id.clone(),
                    })
                } else {
                    Reassembly::default()
                }
            }
            StreamEvent::Error { description } => {
                let delta = match self.error_mode {
                    ErrorMode::Surface => None,
                    ErrorMode::MarkInFlight => {
                        let ids: Vec<String> = messages
                            .iter()
                            .filter(|m| m.is_in_flight())
                            .map(|m| m.id.clone())
                            .collect();
                        (!ids.is_empty()).then_some(MessageDelta::Failed { ids })
                    }
                };
                Reassembly {
                    delta,
                    turn_error: Some(description.clone()),
                }
            }
            StreamEvent::Connection { .. } | StreamEvent::Heartbeat => Reassembly::default(),
        }
    }

    /// `(current messages, event) -> new messages`
    pub fn fold(&self, mut messages: Vec<ChatMessage>, event: &StreamEvent) -> Vec<ChatMessage> {
        if let Some(delta) = self.reassemble(&messages, event).delta {
            delta.apply(&mut messages);
        }
        messages
    }
}

fn find_mut<'a>(messages: &'a mut [ChatMessage], id: &str) -> Option<&'a mut ChatMessage> {
    messages.iter_mut().find(|m| m.id == id)
}
