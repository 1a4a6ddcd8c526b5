//! SSE Transport Implementation
//!
//! Opens `GET {url}` with `Accept: text/event-stream` and a bearer
//! `Authorization` header, then forwards every default-type (`message`) SSE
//! frame as a [`TransportEvent::Message`]. A reader task per channel owns the
//! response body; closing the handle cancels that task.

use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::sse::{SseFrame, SseStream};
use super::{
    Channel, ChannelHandle, ChannelRequest, ReadyState, SharedReadyState, Transport,
    TransportEvent, CHANNEL_BUFFER,
};
use crate::error::{StreamError, StreamResult};

/// reqwest-backed server-push transport
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
}

impl SseTransport {
    /// Build with a dedicated client. No request timeout is set: channels are
    /// long-lived and the connecting window is enforced by the client.
    pub fn new() -> StreamResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StreamError::transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for SseTransport {
    fn open(&self, request: ChannelRequest) -> StreamResult<Channel> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StreamError::transport(format!("no async runtime available: {}", e)))?;

        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let state = SharedReadyState::new();
        let cancel = CancellationToken::new();

        tracing::debug!(url = %request.redacted_url(), "Opening SSE channel");
        runtime.spawn(run_channel(
            self.client.clone(),
            request,
            tx,
            state.clone(),
            cancel.clone(),
        ));

        Ok(Channel {
            events: rx,
            handle: Box::new(SseChannelHandle { state, cancel }),
        })
    }
}

struct SseChannelHandle {
    state: SharedReadyState,
    cancel: CancellationToken,
}

impl ChannelHandle for SseChannelHandle {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn close(&mut self) {
        self.cancel.cancel();
        self.state.set(ReadyState::Closed);
    }
}

impl Drop for SseChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_channel(
    client: reqwest::Client,
    request: ChannelRequest,
    tx: mpsc::Sender<TransportEvent>,
    state: SharedReadyState,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::trace!(session_id = %request.session_id, "SSE reader cancelled");
        }
        reason = read_stream(&client, &request, &tx, &state) => {
            state.set(ReadyState::Closed);
            let _ = tx.send(TransportEvent::Error(reason)).await;
        }
    }
    state.set(ReadyState::Closed);
}

/// Reads until the stream ends; returns why it ended
async fn read_stream(
    client: &reqwest::Client,
    request: &ChannelRequest,
    tx: &mpsc::Sender<TransportEvent>,
    state: &SharedReadyState,
) -> String {
    let response = match client
        .get(request.url.clone())
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .bearer_auth(&request.credential)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return format!("request failed: {}", e),
    };

    let status = response.status();
    if !status.is_success() {
        return format!("server responded with HTTP {}", status);
    }

    state.set(ReadyState::Open);
    if tx.send(TransportEvent::Open).await.is_err() {
        return "channel receiver dropped".to_string();
    }

    let mut body = response.bytes_stream();
    let mut sse = SseStream::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                sse.push(&bytes);
                while let Some(frame) = sse.next_frame() {
                    if !forward(tx, frame).await {
                        return "channel receiver dropped".to_string();
                    }
                }
            }
            Err(e) => return format!("stream interrupted: {}", e),
        }
    }

    if sse.finish() {
        tracing::debug!("Dropped unterminated SSE frame at end of stream");
    }
    "server closed the stream".to_string()
}

async fn forward(tx: &mpsc::Sender<TransportEvent>, frame: SseFrame) -> bool {
    if !frame.is_message() {
        tracing::trace!(event = %frame.event, "Ignoring named SSE frame");
        return true;
    }
    tracing::trace!(data = %frame.data, "SSE frame");
    tx.send(TransportEvent::Message(frame.data)).await.is_ok()
}
