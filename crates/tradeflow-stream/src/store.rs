//! UI-facing chat store
//!
//! Owns the current session and its messages. The streaming client feeds it
//! reassembler deltas; the UI feeds it user input.

use chrono::Utc;

use crate::reassembler::MessageDelta;
use crate::types::{ChatMessage, FileAttachment, MessageRole, MessageStatus, Session};

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Default)]
pub struct ChatStore {
    session: Option<Session>,
    messages: Vec<ChatMessage>,
    streaming: bool,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// True between the first chunk of a turn and its completion or failure
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Switch to another session; its messages are loaded by the caller
    pub fn set_session(&mut self, session: Option<Session>) {
        self.session = session;
        self.messages.clear();
        self.streaming = false;
    }

    /// Replace the message list, e.g. with history fetched over REST
    pub fn load_messages(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
        self.streaming = self.messages.iter().any(ChatMessage::is_in_flight);
    }

    /// Record a user submission and return the stored message
    pub fn push_user_message(
        &mut self,
        content: impl Into<String>,
        files: Vec<FileAttachment>,
    ) -> ChatMessage {
        let message = ChatMessage::user(content, files);
        self.touch_session(&message.content, true);
        self.messages.push(message.clone());
        message
    }

    /// Update a message's status; returns false if the id is unknown
    pub fn set_status(&mut self, id: &str, status: MessageStatus) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.status = status;
                true
            }
            None => false,
        }
    }

    /// Apply a delta proposed by the reassembler
    pub fn apply(&mut self, delta: &MessageDelta) {
        delta.apply(&mut self.messages);
        match delta {
            MessageDelta::Created(message) => {
                self.streaming = true;
                self.touch_session(&message.content, true);
            }
            MessageDelta::Appended { .. } => self.streaming = true,
            MessageDelta::Finalized { id } => {
                let preview = self
                    .message(id)
                    .filter(|m| m.role == MessageRole::Assistant)
                    .map(|m| m.content.clone());
                if let Some(preview) = preview {
                    self.touch_session(&preview, false);
                }
                self.streaming = self.messages.iter().any(ChatMessage::is_in_flight);
            }
            MessageDelta::Failed { .. } => self.streaming = false,
        }
    }

    /// The current turn ended without a completion
    pub fn end_turn(&mut self) {
        self.streaming = false;
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.streaming = false;
    }

    fn touch_session(&mut self, content: &str, counts: bool) {
        if let Some(session) = self.session.as_mut() {
            if counts {
                session.message_count += 1;
            }
            if !content.is_empty() {
                session.last_message_preview = Some(content.chars().take(PREVIEW_CHARS).collect());
            }
            session.updated_at = Utc::now();
        }
    }
}
