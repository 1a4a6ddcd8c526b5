//! Connection state exposed to UI collaborators

use chrono::{DateTime, Utc};

use crate::error::{Severity, StreamError};

/// Channel lifecycle
///
/// ```text
/// disconnected --connect--> connecting --open--> connected
///       ^                      |   ^                 |
///       |                error/timeout  retry        | error
///       |                      v   |                 v
///       +-----disconnect------ error <---------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error(StreamError),
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error(_) => "error",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(reason) => write!(f, "error({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// Snapshot published on every change
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Session the client is bound to, kept across retries
    pub session_id: Option<String>,
    /// Most recent visible error, including non-fatal ones
    pub last_error: Option<StreamError>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    /// When the server last sent a heartbeat on the live channel
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting
    }

    pub fn is_error(&self) -> bool {
        matches!(self.state, ConnectionState::Error(_))
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Error(StreamError::RetryBudgetExhausted { .. })
        )
    }

    pub fn error_message(&self) -> Option<String> {
        self.last_error.as_ref().map(|e| e.to_string())
    }
}

/// Visual level of the connection indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorLevel {
    Processing,
    Success,
    Error,
    Idle,
}

/// Presentation-neutral description of the connection status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIndicator {
    pub level: IndicatorLevel,
    pub label: &'static str,
    pub description: String,
    pub severity: Option<Severity>,
    pub offer_reconnect: bool,
    pub offer_disconnect: bool,
}

impl From<&ConnectionStatus> for ConnectionIndicator {
    fn from(status: &ConnectionStatus) -> Self {
        match &status.state {
            ConnectionState::Connecting => Self {
                level: IndicatorLevel::Processing,
                label: "Connecting",
                description: if status.attempts_made > 0 {
                    format!(
                        "Reconnecting to the server (attempt {}/{})",
                        status.attempts_made, status.max_attempts
                    )
                } else {
                    "Establishing a connection to the server".to_string()
                },
                severity: None,
                offer_reconnect: false,
                offer_disconnect: true,
            },
            ConnectionState::Connected => Self {
                level: IndicatorLevel::Success,
                label: "Connected",
                description: "Real-time updates are active".to_string(),
                severity: None,
                offer_reconnect: false,
                offer_disconnect: true,
            },
            ConnectionState::Error(reason) => Self {
                level: IndicatorLevel::Error,
                label: if status.is_exhausted() {
                    "Connection lost"
                } else {
                    "Connection problem"
                },
                description: reason.to_string(),
                severity: Some(reason.severity()),
                offer_reconnect: true,
                offer_disconnect: false,
            },
            ConnectionState::Disconnected => Self {
                level: IndicatorLevel::Idle,
                label: "Disconnected",
                description: "Not connected to the server".to_string(),
                severity: None,
                offer_reconnect: status.session_id.is_some(),
                offer_disconnect: false,
            },
        }
    }
}
