//! Transport layer
//!
//! The connection manager talks to the network only through [`Transport`].
//! Opening returns immediately with a [`Channel`]: a receiver of
//! [`TransportEvent`]s plus a [`ChannelHandle`] used to inspect liveness and
//! to close. Channels are receive-only; nothing is ever sent into them.
//!
//! # Available Transports
//!
//! - **SseTransport**: HTTP `text/event-stream` over reqwest

pub mod http;
pub mod sse;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};

pub use http::SseTransport;
pub use sse::{SseDecoder, SseFrame, SseStream};

/// Capacity of a channel's event queue
pub const CHANNEL_BUFFER: usize = 256;

/// Signals a channel delivers, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is open and will start delivering payloads
    Open,
    /// One text payload
    Message(String),
    /// The channel failed or closed; nothing follows
    Error(String),
}

/// Channel liveness, mirroring the browser `EventSource.readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}

/// Ready state shared between a channel's reader task and its handle
#[derive(Debug, Clone)]
pub struct SharedReadyState(Arc<AtomicU8>);

impl SharedReadyState {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(0)))
    }

    pub fn get(&self) -> ReadyState {
        match self.0.load(Ordering::SeqCst) {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            _ => ReadyState::Closed,
        }
    }

    pub fn set(&self, state: ReadyState) {
        let raw = match state {
            ReadyState::Connecting => 0,
            ReadyState::Open => 1,
            ReadyState::Closed => 2,
        };
        self.0.store(raw, Ordering::SeqCst);
    }
}

impl Default for SharedReadyState {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameters of one channel establishment
#[derive(Clone)]
pub struct ChannelRequest {
    pub session_id: String,
    pub credential: String,
    pub url: Url,
}

impl ChannelRequest {
    /// `{base_url}/{stream_path}?session_id=..&token=..`
    pub fn new(
        config: &StreamConfig,
        session_id: impl Into<String>,
        credential: impl Into<String>,
    ) -> StreamResult<Self> {
        let session_id = session_id.into();
        let credential = credential.into();
        let raw = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.stream_path.trim_start_matches('/')
        );
        let mut url = Url::parse(&raw)
            .map_err(|e| StreamError::transport(format!("invalid stream URL '{}': {}", raw, e)))?;
        url.query_pairs_mut()
            .append_pair("session_id", &session_id)
            .append_pair("token", &credential);
        Ok(Self {
            session_id,
            credential,
            url,
        })
    }

    /// URL with the token stripped, for logs
    pub fn redacted_url(&self) -> String {
        let mut url = self.url.clone();
        let pairs: Vec<(String, String)> = self
            .url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == "token" { "***".to_string() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        url.to_string()
    }
}

impl fmt::Debug for ChannelRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRequest")
            .field("session_id", &self.session_id)
            .field("credential", &"***")
            .field("url", &self.redacted_url())
            .finish()
    }
}

/// Control side of an open channel
pub trait ChannelHandle: Send {
    fn ready_state(&self) -> ReadyState;

    /// Close the channel; must be idempotent
    fn close(&mut self);
}

/// A channel as returned by [`Transport::open`]
pub struct Channel {
    pub events: mpsc::Receiver<TransportEvent>,
    pub handle: Box<dyn ChannelHandle>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("ready_state", &self.handle.ready_state())
            .finish()
    }
}

/// Factory of server-push channels
pub trait Transport: Send + Sync {
    /// Start opening a channel. Returns without waiting for the open signal.
    fn open(&self, request: ChannelRequest) -> StreamResult<Channel>;
}
