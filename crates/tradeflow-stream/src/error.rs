//! Error types for the streaming session client
//!
//! Runtime failures are reported through [`StreamError`]. Only
//! [`StreamError::Unauthorized`] and [`StreamError::ClientClosed`] are ever
//! returned directly from a handle method; everything else is delivered
//! asynchronously through the status observable and the notice stream.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type StreamResult<T> = Result<T, StreamError>;

/// How a UI collaborator should surface an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Dismissible notification plus the inline status indicator
    Transient,
    /// Needs an explicit user action (sign in again, manual reconnect)
    Actionable,
}

/// Streaming client error taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// No credential was available when a channel had to be opened
    #[error("Unauthorized: sign in before connecting")]
    Unauthorized,

    /// The channel did not reach `connected` within the connecting window
    #[error("Connection timed out after {timeout:?}")]
    ConnectionTimeout {
        /// Configured connecting window
        timeout: Duration,
    },

    /// The channel failed to open or closed after having been open
    #[error("Transport error: {message}")]
    Transport {
        /// Transport-provided description
        message: String,
    },

    /// A single event payload could not be decoded
    #[error("Parse error: {message}")]
    Parse {
        /// Decoder description
        message: String,
        /// The offending payload, verbatim
        payload: String,
    },

    /// Every automatic reconnection attempt has failed
    #[error("Connection failed after {attempts} reconnection attempts, reconnect manually")]
    RetryBudgetExhausted {
        /// Number of scheduled attempts that were made
        attempts: u32,
    },

    /// The server reported an application-level failure for the current turn
    #[error("Server error: {description}")]
    ServerSignaled {
        /// Description sent by the server
        description: String,
    },

    /// The driver task is gone; the handle can no longer be used
    #[error("Streaming client has been shut down")]
    ClientClosed,
}

impl StreamError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            payload: payload.into(),
        }
    }

    /// Whether the reconnection policy may retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. } | Self::Transport { .. })
    }

    /// Whether this error ends automatic recovery until the caller acts
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::RetryBudgetExhausted { .. } | Self::ClientClosed
        )
    }

    /// Whether the channel stays open after this error
    pub fn keeps_channel(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::ServerSignaled { .. })
    }

    pub fn severity(&self) -> Severity {
        if self.is_terminal() {
            Severity::Actionable
        } else {
            Severity::Transient
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(StreamError::transport("reset").is_retryable());
        assert!(StreamError::ConnectionTimeout {
            timeout: Duration::from_secs(60)
        }
        .is_retryable());
        assert!(!StreamError::Unauthorized.is_retryable());
        assert!(!StreamError::parse("bad json", "{").is_retryable());
        assert!(!StreamError::RetryBudgetExhausted { attempts: 5 }.is_retryable());
    }

    #[test]
    fn test_severity() {
        assert_eq!(
            StreamError::RetryBudgetExhausted { attempts: 3 }.severity(),
            Severity::Actionable
        );
        assert_eq!(StreamError::Unauthorized.severity(), Severity::Actionable);
        assert_eq!(
            StreamError::transport("closed").severity(),
            Severity::Transient
        );
        assert_eq!(
            StreamError::ServerSignaled {
                description: "model overloaded".into()
            }
            .severity(),
            Severity::Transient
        );
    }

    #[test]
    fn test_keeps_channel() {
        assert!(StreamError::parse("bad", "x").keeps_channel());
        assert!(!StreamError::transport("x").keeps_channel());
    }

    #[test]
    fn test_display() {
        let err = StreamError::RetryBudgetExhausted { attempts: 3 };
        assert!(err.to_string().contains("3 reconnection attempts"));

        let err = ConfigError::invalid("base_url", "must not be empty");
        assert_eq!(err.to_string(), "Invalid value for base_url: must not be empty");
    }
}
