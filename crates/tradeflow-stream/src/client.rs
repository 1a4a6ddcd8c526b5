//! Streaming Session Client
//!
//! [`StreamClient`] is a cheap handle; all state lives in a single driver
//! task that reacts to one input at a time:
//!
//! - caller commands (`connect`, `disconnect`, heartbeat check)
//! - signals from the live channel (open, payload, error)
//! - timers (connecting window, heartbeat check, scheduled retry)
//! - credential changes
//!
//! Only the live channel's receiver is ever polled. Superseding or closing a
//! channel drops its receiver, so nothing a stale transport delivers can
//! reach the reassembler.
//!
//! State is published through a `watch` of [`ConnectionStatus`] and a
//! `broadcast` of [`ClientEvent`]s. The message collection lives in a shared
//! [`ChatStore`].

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};

use crate::auth::CredentialProvider;
use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::event::StreamEvent;
use crate::history::{EventHistory, ReceivedEvent};
use crate::policy::{ReconnectDecision, ReconnectPolicy};
use crate::reassembler::{MessageDelta, Reassembler};
use crate::state::{ConnectionIndicator, ConnectionState, ConnectionStatus};
use crate::store::ChatStore;
use crate::transport::{ChannelHandle, ChannelRequest, ReadyState, Transport, TransportEvent};
use crate::types::ChatMessage;

const EVENT_BUFFER: usize = 256;
const CONNECTION_ESTABLISHED: &str = "stream connection established";

/// Push notifications for UI collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The status snapshot changed
    StateChanged(ConnectionStatus),
    /// A non-heartbeat event was recorded
    Event(StreamEvent),
    /// A delta was applied to the chat store
    Message(MessageDelta),
    /// An error to show as a notification
    Notice(StreamError),
    /// A reconnection attempt was scheduled
    Reconnecting { attempt: u32, delay: Duration },
}

/// Result of a heartbeat check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHealth {
    pub state: ConnectionState,
    /// `None` when no channel is live
    pub ready_state: Option<ReadyState>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

impl ChannelHealth {
    pub fn is_alive(&self) -> bool {
        self.ready_state == Some(ReadyState::Open)
    }
}

enum Command {
    Connect {
        session_id: String,
        credential: String,
        ack: oneshot::Sender<()>,
    },
    Disconnect {
        ack: oneshot::Sender<()>,
    },
    CheckHeartbeat {
        reply: oneshot::Sender<ChannelHealth>,
    },
}

struct ClientInner {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    events: broadcast::Sender<ClientEvent>,
    history: Arc<RwLock<EventHistory>>,
    store: Arc<RwLock<ChatStore>>,
    credentials: Arc<dyn CredentialProvider>,
}

/// Handle to the streaming session client
///
/// Clones share the same driver. Dropping the last clone stops the driver
/// and closes the live channel.
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<ClientInner>,
}

impl StreamClient {
    /// Create a client and spawn its driver on the current tokio runtime
    pub fn new(
        config: StreamConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self::with_store(config, transport, credentials, ChatStore::new())
    }

    /// Same as [`StreamClient::new`] with a pre-populated store
    pub fn with_store(
        config: StreamConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        store: ChatStore,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let initial = ConnectionStatus {
            max_attempts: config.reconnect.max_attempts,
            ..Default::default()
        };
        let (status_tx, status_rx) = watch::channel(initial);
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        let history = Arc::new(RwLock::new(EventHistory::new(config.history_limit)));
        let store = Arc::new(RwLock::new(store));
        let credential_changes = credentials.subscribe();

        let driver = Driver {
            policy: ReconnectPolicy::new(config.reconnect.clone()),
            reassembler: Reassembler::new(config.error_mode()),
            config,
            transport,
            credentials: credentials.clone(),
            status: status_tx,
            events: events_tx.clone(),
            history: history.clone(),
            store: store.clone(),
            live: None,
            session_id: None,
            generation: 0,
            connect_deadline: None,
            next_heartbeat: None,
            retry_at: None,
        };
        tokio::spawn(driver.run(commands_rx, credential_changes));

        Self {
            inner: Arc::new(ClientInner {
                commands: commands_tx,
                status: status_rx,
                events: events_tx,
                history,
                store,
                credentials,
            }),
        }
    }

    /// Bind to `session_id` and start opening a channel
    ///
    /// Returns once the driver has started the attempt, not once the channel
    /// is connected. Fails with [`StreamError::Unauthorized`] without touching
    /// the current channel when no credential is available.
    pub async fn connect(&self, session_id: impl Into<String>) -> StreamResult<()> {
        let session_id = session_id.into();
        let Some(credential) = current_credential(self.inner.credentials.as_ref()) else {
            tracing::warn!(session_id = %session_id, "Refusing to connect without a credential");
            return Err(StreamError::Unauthorized);
        };
        let (ack, done) = oneshot::channel();
        self.send(Command::Connect {
            session_id,
            credential,
            ack,
        })?;
        done.await.map_err(|_| StreamError::ClientClosed)
    }

    /// Close the channel, cancel every timer and reset the retry budget
    pub async fn disconnect(&self) -> StreamResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Disconnect { ack })?;
        done.await.map_err(|_| StreamError::ClientClosed)
    }

    /// Run the liveness check now instead of waiting for the next period
    pub async fn check_heartbeat(&self) -> StreamResult<ChannelHealth> {
        let (reply, health) = oneshot::channel();
        self.send(Command::CheckHeartbeat { reply })?;
        health.await.map_err(|_| StreamError::ClientClosed)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub fn indicator(&self) -> ConnectionIndicator {
        ConnectionIndicator::from(&*self.inner.status.borrow())
    }

    /// Non-heartbeat events received, oldest first
    pub fn history(&self) -> Vec<ReceivedEvent> {
        self.inner.history.read().events()
    }

    pub fn last_event(&self) -> Option<ReceivedEvent> {
        self.inner.history.read().last().cloned()
    }

    pub fn clear_history(&self) {
        self.inner.history.write().clear();
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.store.read().messages().to_vec()
    }

    pub fn store(&self) -> Arc<RwLock<ChatStore>> {
        self.inner.store.clone()
    }

    fn send(&self, command: Command) -> StreamResult<()> {
        self.inner
            .commands
            .send(command)
            .map_err(|_| StreamError::ClientClosed)
    }
}

fn current_credential(credentials: &dyn CredentialProvider) -> Option<String> {
    credentials.bearer_token().filter(|t| !t.is_empty())
}

/// The one channel the driver currently owns
struct LiveChannel {
    generation: u64,
    credential: String,
    events: mpsc::Receiver<TransportEvent>,
    handle: Box<dyn ChannelHandle>,
}

struct Driver {
    config: StreamConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    policy: ReconnectPolicy,
    reassembler: Reassembler,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<ClientEvent>,
    history: Arc<RwLock<EventHistory>>,
    store: Arc<RwLock<ChatStore>>,
    live: Option<LiveChannel>,
    session_id: Option<String>,
    generation: u64,
    connect_deadline: Option<Instant>,
    next_heartbeat: Option<Instant>,
    retry_at: Option<Instant>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut credential_changes: Option<watch::Receiver<Option<String>>>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                signal = next_signal(&mut self.live) => self.handle_signal(signal),
                _ = sleep_until_some(self.connect_deadline) => self.on_connect_timeout(),
                _ = sleep_until_some(self.next_heartbeat) => self.on_heartbeat_due(),
                _ = sleep_until_some(self.retry_at) => self.on_retry_due(),
                change = credential_change(&mut credential_changes) => match change {
                    Some(token) => self.on_credential_change(token),
                    None => credential_changes = None,
                },
            }
        }

        self.close_channel();
        tracing::debug!("Stream client driver stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect {
                session_id,
                credential,
                ack,
            } => {
                self.connect(session_id, credential);
                let _ = ack.send(());
            }
            Command::Disconnect { ack } => {
                self.disconnect();
                let _ = ack.send(());
            }
            Command::CheckHeartbeat { reply } => {
                let health = self.health();
                let _ = reply.send(health);
                self.check_liveness();
            }
        }
    }

    fn connect(&mut self, session_id: String, credential: String) {
        tracing::info!(session_id = %session_id, "Connecting stream");
        self.retry_at = None;
        self.policy.reset();
        self.session_id = Some(session_id.clone());
        self.open_channel(session_id, credential);
    }

    fn disconnect(&mut self) {
        self.close_channel();
        self.retry_at = None;
        self.policy.reset();
        if let Some(session_id) = self.session_id.take() {
            tracing::info!(session_id = %session_id, "Stream disconnected");
        }
        self.update_status(|status| {
            status.state = ConnectionState::Disconnected;
            status.session_id = None;
            status.last_error = None;
            status.last_heartbeat_at = None;
        });
    }

    fn open_channel(&mut self, session_id: String, credential: String) {
        self.close_channel();
        self.generation += 1;
        let generation = self.generation;

        self.update_status(|status| {
            status.state = ConnectionState::Connecting;
            status.session_id = Some(session_id.clone());
        });

        let opened = ChannelRequest::new(&self.config, session_id.as_str(), credential.as_str())
            .and_then(|request| self.transport.open(request));
        match opened {
            Ok(channel) => {
                tracing::debug!(session_id = %session_id, generation, "Channel opening");
                self.live = Some(LiveChannel {
                    generation,
                    credential,
                    events: channel.events,
                    handle: channel.handle,
                });
                self.connect_deadline = Some(Instant::now() + self.config.connection_timeout());
            }
            Err(error) => self.fail(error),
        }
    }

    /// Close and forget the live channel along with its timers
    fn close_channel(&mut self) {
        if let Some(mut live) = self.live.take() {
            live.handle.close();
            tracing::debug!(generation = live.generation, "Channel closed");
        }
        self.connect_deadline = None;
        self.next_heartbeat = None;
    }

    fn handle_signal(&mut self, signal: Option<TransportEvent>) {
        match signal {
            Some(TransportEvent::Open) => self.on_open(),
            Some(TransportEvent::Message(payload)) => self.on_payload(&payload),
            Some(TransportEvent::Error(reason)) => self.fail(StreamError::transport(reason)),
            None => self.fail(StreamError::transport("channel closed")),
        }
    }

    fn on_open(&mut self) {
        if self.status.borrow().is_connected() {
            return;
        }
        self.connect_deadline = None;
        self.next_heartbeat = self
            .config
            .heartbeat_interval()
            .map(|interval| Instant::now() + interval);
        self.policy.on_connected();

        tracing::info!(
            session_id = self.session_id.as_deref().unwrap_or_default(),
            generation = self.generation,
            "Stream connected"
        );
        self.update_status(|status| {
            status.state = ConnectionState::Connected;
            status.last_error = None;
        });
        self.record(StreamEvent::Connection {
            content: Some(CONNECTION_ESTABLISHED.to_string()),
        });
    }

    fn on_payload(&mut self, payload: &str) {
        let event = match StreamEvent::parse(payload) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(error = %error, "Dropping malformed stream payload");
                self.report(error);
                return;
            }
        };

        if event.is_heartbeat() {
            tracing::trace!("Server heartbeat");
            let now = Utc::now();
            self.update_status(|status| status.last_heartbeat_at = Some(now));
            return;
        }

        tracing::debug!(
            kind = event.kind(),
            message_id = event.message_id().unwrap_or_default(),
            "Stream event"
        );
        self.record(event.clone());

        let outcome = {
            let mut store = self.store.write();
            let outcome = self.reassembler.reassemble(store.messages(), &event);
            if let Some(delta) = &outcome.delta {
                store.apply(delta);
            }
            if outcome.turn_error.is_some() {
                store.end_turn();
            }
            outcome
        };

        if let Some(delta) = outcome.delta {
            let _ = self.events.send(ClientEvent::Message(delta));
        }
        if let Some(description) = outcome.turn_error {
            tracing::warn!(description = %description, "Server reported a turn failure");
            self.report(StreamError::ServerSignaled { description });
        }
    }

    fn on_connect_timeout(&mut self) {
        self.connect_deadline = None;
        if !self.status.borrow().is_connecting() {
            return;
        }
        let timeout = self.config.connection_timeout();
        tracing::warn!(
            session_id = self.session_id.as_deref().unwrap_or_default(),
            timeout_ms = timeout.as_millis() as u64,
            "Stream connection timed out"
        );
        self.fail(StreamError::ConnectionTimeout { timeout });
    }

    fn on_heartbeat_due(&mut self) {
        self.next_heartbeat = self
            .config
            .heartbeat_interval()
            .map(|interval| Instant::now() + interval);
        self.check_liveness();
    }

    /// Fail the channel if the transport reports it closed
    fn check_liveness(&mut self) {
        if !self.status.borrow().is_connected() {
            return;
        }
        let ready_state = self.live.as_ref().map(|live| live.handle.ready_state());
        tracing::debug!(ready_state = ?ready_state, "Heartbeat check");
        if ready_state != Some(ReadyState::Open) {
            self.fail(StreamError::transport("channel closed"));
        }
    }

    fn health(&self) -> ChannelHealth {
        let status = self.status.borrow();
        ChannelHealth {
            state: status.state.clone(),
            ready_state: self.live.as_ref().map(|live| live.handle.ready_state()),
            last_heartbeat_at: status.last_heartbeat_at,
        }
    }

    fn on_retry_due(&mut self) {
        self.retry_at = None;
        let Some(session_id) = self.session_id.clone() else {
            return;
        };
        match current_credential(self.credentials.as_ref()) {
            Some(credential) => {
                tracing::info!(
                    session_id = %session_id,
                    attempt = self.policy.budget().attempts_made(),
                    "Reconnecting stream"
                );
                self.open_channel(session_id, credential);
            }
            None => {
                tracing::warn!(session_id = %session_id, "Credential gone, not reconnecting");
                let error = StreamError::Unauthorized;
                self.update_status(|status| {
                    status.state = ConnectionState::Error(error.clone());
                    status.last_error = Some(error.clone());
                });
                self.notice(error);
            }
        }
    }

    fn on_credential_change(&mut self, token: Option<String>) {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return;
        };
        if !self.status.borrow().is_connected() {
            return;
        }
        let unchanged = self
            .live
            .as_ref()
            .is_some_and(|live| live.credential == token);
        if unchanged {
            return;
        }
        let Some(session_id) = self.session_id.clone() else {
            return;
        };
        tracing::info!(session_id = %session_id, "Credential changed, reopening stream");
        self.open_channel(session_id, token);
    }

    /// Error path shared by transport errors, timeouts and failed checks
    fn fail(&mut self, error: StreamError) {
        tracing::warn!(
            session_id = self.session_id.as_deref().unwrap_or_default(),
            generation = self.generation,
            error = %error,
            "Stream channel failed"
        );
        self.close_channel();
        // the turn is over for the UI; partial message keeps its status
        self.store.write().end_turn();
        self.update_status(|status| {
            status.state = ConnectionState::Error(error.clone());
            status.last_error = Some(error.clone());
        });
        self.notice(error.clone());

        if !error.is_retryable() {
            return;
        }
        match self.policy.on_failure() {
            ReconnectDecision::Retry { attempt, delay } => {
                tracing::info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnection"
                );
                self.retry_at = Some(Instant::now() + delay);
                self.update_status(|_| {});
                let _ = self.events.send(ClientEvent::Reconnecting { attempt, delay });
            }
            ReconnectDecision::Exhausted { attempts } => {
                tracing::warn!(attempts, "Reconnection attempts exhausted");
                let exhausted = StreamError::RetryBudgetExhausted { attempts };
                self.update_status(|status| {
                    status.state = ConnectionState::Error(exhausted.clone());
                    status.last_error = Some(exhausted.clone());
                });
                self.notice(exhausted);
            }
            ReconnectDecision::Disabled => {
                tracing::debug!("Automatic reconnection disabled");
            }
        }
    }

    /// Non-fatal error: visible, channel untouched
    fn report(&self, error: StreamError) {
        self.update_status(|status| status.last_error = Some(error.clone()));
        self.notice(error);
    }

    fn notice(&self, error: StreamError) {
        let _ = self.events.send(ClientEvent::Notice(error));
    }

    fn record(&self, event: StreamEvent) {
        self.history.write().record(event.clone());
        let _ = self.events.send(ClientEvent::Event(event));
    }

    fn update_status(&self, update: impl FnOnce(&mut ConnectionStatus)) {
        let budget = self.policy.budget();
        let changed = self.status.send_if_modified(|status| {
            let before = status.clone();
            update(status);
            status.attempts_made = budget.attempts_made();
            status.max_attempts = budget.max_attempts();
            *status != before
        });
        if changed {
            let snapshot = self.status.borrow().clone();
            tracing::debug!(state = %snapshot.state, "Stream status changed");
            let _ = self.events.send(ClientEvent::StateChanged(snapshot));
        }
    }
}

async fn next_signal(live: &mut Option<LiveChannel>) -> Option<TransportEvent> {
    match live {
        Some(live) => live.events.recv().await,
        None => pending().await,
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Next credential value; `None` once the provider is gone
async fn credential_change(
    changes: &mut Option<watch::Receiver<Option<String>>>,
) -> Option<Option<String>> {
    match changes {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => pending().await,
    }
}
