//! Credential provider seam
//!
//! The client never looks up credentials globally: a provider is injected at
//! construction and read synchronously at every channel open.

use std::sync::Arc;
use tokio::sync::watch;

/// Source of the bearer credential used to open channels
pub trait CredentialProvider: Send + Sync {
    /// Current credential, `None` when signed out
    fn bearer_token(&self) -> Option<String>;

    /// Change notifications, if the provider supports them
    fn subscribe(&self) -> Option<watch::Receiver<Option<String>>> {
        None
    }
}

/// Fixed credential
#[derive(Debug, Clone)]
pub struct StaticCredentials(Option<String>);

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn signed_out() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Credential updated by the auth collaborator (sign in, refresh, sign out)
#[derive(Debug, Clone)]
pub struct SharedCredentials {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl SharedCredentials {
    pub fn new(token: Option<String>) -> Self {
        let (tx, _rx) = watch::channel(token.filter(|t| !t.is_empty()));
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        self.tx.send_replace((!token.is_empty()).then_some(token));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }
}

impl CredentialProvider for SharedCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> Option<watch::Receiver<Option<String>>> {
        Some(self.tx.subscribe())
    }
}
