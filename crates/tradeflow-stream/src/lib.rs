//! TradeFlow streaming session client
//!
//! Keeps one server-push channel per chat session, folds the streamed
//! fragments into chat messages and recovers from dropped connections.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 UI collaborator / CLI                    │
//! │      status watch · ClientEvent broadcast · ChatStore    │
//! ├──────────────────────────────────────────────────────────┤
//! │                      StreamClient                        │
//! │  ┌──────────────┐  ┌───────────────┐  ┌───────────────┐  │
//! │  │ driver task  │─▶│  Reassembler  │─▶│   ChatStore   │  │
//! │  │ (connection) │  └───────────────┘  └───────────────┘  │
//! │  │              │◀─ ReconnectPolicy · EventHistory       │
//! │  └──────┬───────┘                                        │
//! ├─────────┼────────────────────────────────────────────────┤
//! │         ▼   Transport (SseTransport / test fake)         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tradeflow_stream::{SseTransport, StaticCredentials, StreamClient, StreamConfig};
//!
//! let config = StreamConfig::load(None)?;
//! let client = StreamClient::new(
//!     config,
//!     Arc::new(SseTransport::new()?),
//!     Arc::new(StaticCredentials::new("token")),
//! );
//! client.connect("session-1").await?;
//! let mut status = client.subscribe_status();
//! status.wait_for(|s| s.is_connected()).await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod history;
pub mod policy;
pub mod reassembler;
pub mod state;
pub mod store;
pub mod transport;
pub mod types;


pub use auth::{CredentialProvider, SharedCredentials, StaticCredentials};
pub use client::{ChannelHealth, ClientEvent, StreamClient};
pub use config::{Backoff, ReconnectConfig, StreamConfig};
pub use error::{ConfigError, Severity, StreamError, StreamResult};
pub use event::StreamEvent;
pub use history::{EventHistory, ReceivedEvent};
pub use policy::{ReconnectDecision, ReconnectPolicy, RetryBudget};
pub use reassembler::{ErrorMode, MessageDelta, Reassembler, Reassembly};
pub use state::{ConnectionIndicator, ConnectionState, ConnectionStatus, IndicatorLevel};
pub use store::ChatStore;
pub use transport::{SseTransport, Transport};
pub use types::{ChatMessage, FileAttachment, MessageRole, MessageStatus, Session};
