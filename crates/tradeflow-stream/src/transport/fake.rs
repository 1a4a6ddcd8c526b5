//! Scripted transport for driving the client deterministically in tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{
    Channel, ChannelHandle, ChannelRequest, ReadyState, SharedReadyState, Transport,
    TransportEvent, CHANNEL_BUFFER,
};
use crate::error::StreamResult;
use crate::event::StreamEvent;

/// Test-side view of one opened channel
#[derive(Clone)]
pub(crate) struct FakeChannel {
    pub request: ChannelRequest,
    pub opened_at: Instant,
    tx: mpsc::Sender<TransportEvent>,
    state: SharedReadyState,
    closed: Arc<AtomicBool>,
}

impl FakeChannel {
    pub fn session_id(&self) -> &str {
        &self.request.session_id
    }

    /// Deliver the open signal
    pub fn open(&self) {
        self.state.set(ReadyState::Open);
        let _ = self.tx.try_send(TransportEvent::Open);
    }

    pub fn message(&self, payload: &str) {
        let _ = self.tx.try_send(TransportEvent::Message(payload.to_string()));
    }

    pub fn event(&self, event: &StreamEvent) {
        self.message(&event.to_payload());
    }

    /// Deliver a transport error
    pub fn fail(&self, reason: &str) {
        self.state.set(ReadyState::Closed);
        let _ = self.tx.try_send(TransportEvent::Error(reason.to_string()));
    }

    /// Change liveness without signalling anything
    pub fn set_ready_state(&self, state: ReadyState) {
        self.state.set(state);
    }

    /// Whether the client closed this channel
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeHandle {
    state: SharedReadyState,
    closed: Arc<AtomicBool>,
}

impl ChannelHandle for FakeHandle {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.state.set(ReadyState::Closed);
    }
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    channels: Mutex<Vec<FakeChannel>>,
    refusing: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every channel fails as soon as it is opened
    pub fn refusing() -> Arc<Self> {
        let transport = Self::default();
        transport.refusing.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn channels(&self) -> Vec<FakeChannel> {
        self.channels.lock().clone()
    }

    pub fn channel(&self, index: usize) -> FakeChannel {
        self.channels.lock()[index].clone()
    }

    pub fn last(&self) -> FakeChannel {
        self.channels
            .lock()
            .last()
            .cloned()
            .expect("no channel has been opened")
    }
}

impl Transport for FakeTransport {
    fn open(&self, request: ChannelRequest) -> StreamResult<Channel> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let state = SharedReadyState::new();
        let closed = Arc::new(AtomicBool::new(false));
        let fake = FakeChannel {
            request,
            opened_at: Instant::now(),
            tx,
            state: state.clone(),
            closed: closed.clone(),
        };
        if self.refusing.load(Ordering::SeqCst) {
            fake.fail("connection refused");
        }
        self.channels.lock().push(fake);

        Ok(Channel {
            events: rx,
            handle: Box::new(FakeHandle { state, closed }),
        })
    }
}
