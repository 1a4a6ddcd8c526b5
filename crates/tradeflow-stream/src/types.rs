//! Chat data model shared by the reassembler and the chat store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One logical conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            created_at: now,
            updated_at: now,
            message_count: 0,
            last_message_preview: None,
        }
    }
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Lifecycle of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Still streaming (assistant) or awaiting acknowledgement (user)
    Sending,
    Sent,
    Error,
}

/// File attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

/// UI-visible chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileAttachment>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Assistant message created by the first chunk of a turn
    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::Assistant,
            content: content.into(),
            status: MessageStatus::Sending,
            files: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// User message created on submit, with a fresh identifier
    pub fn user(content: impl Into<String>, files: Vec<FileAttachment>) -> Self {
        Self {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            role: MessageRole::User,
            content: content.into(),
            status: MessageStatus::Sending,
            files,
            timestamp: Utc::now(),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.role == MessageRole::Assistant && self.status == MessageStatus::Sending
    }
}
