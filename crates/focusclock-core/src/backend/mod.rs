//! Persistence backends.
//!
//! The engine reads and writes [`ClockState`] through one capability set
//! with two implementations:
//!
//! - [`RemoteSyncStore`]: per-identity document in a synced store; writes
//!   are fire-and-forget and other devices' writes arrive as pushes
//! - [`LocalStore`]: a single SQLite slot; never pushes
//!
//! Which one is active is decided by [`BackendSelector`] from the
//! authentication signal.

mod http;
mod local;
mod remote;

pub use http::HttpTransport;
pub use local::{LocalStore, LOCAL_STATE_KEY};
pub use remote::{MemoryTransport, RemoteSyncStore, RemoteTransport};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::StoreError;
use crate::state::ClockState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Remote,
    Local,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Remote => "remote",
            BackendKind::Local => "local",
        }
    }

    pub fn is_cloud(&self) -> bool {
        matches!(self, BackendKind::Remote)
    }
}

/// Receives whole states pushed by a backend.
pub type StateSink = mpsc::UnboundedSender<ClockState>;

#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Read the durable state. An empty slot yields defaults; a malformed
    /// document is repaired part by part.
    async fn load(&self) -> Result<ClockState, StoreError>;

    /// Replace the durable state wholesale.
    async fn save(&self, state: &ClockState) -> Result<(), StoreError>;

    /// Deliver externally written states to `sink` until the returned
    /// subscription is cancelled or dropped.
    fn subscribe(&self, sink: StateSink) -> Subscription;
}

/// Live push registration. Cancelled on drop.
#[derive(Debug)]
pub struct Subscription {
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// A subscription that never delivers anything.
    pub fn inert() -> Self {
        Self::new(CancellationToken::new())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Two-valued authentication signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AuthStatus {
    Connected { uid: String },
    Disconnected,
}

/// Maps the authentication signal to the backend the engine should use.
#[derive(Clone)]
pub struct BackendSelector {
    local: Arc<dyn PersistenceBackend>,
    transport: Option<Arc<dyn RemoteTransport>>,
    defaults: ClockState,
}

impl BackendSelector {
    pub fn new(local: Arc<dyn PersistenceBackend>, defaults: ClockState) -> Self {
        Self {
            local,
            transport: None,
            defaults,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn select(&self, status: &AuthStatus) -> Arc<dyn PersistenceBackend> {
        match (status, &self.transport) {
            (AuthStatus::Connected { uid }, Some(transport)) => Arc::new(
                RemoteSyncStore::new(transport.clone(), uid).with_defaults(self.defaults.clone()),
            ),
            (AuthStatus::Connected { uid }, None) => {
                warn!("user {uid} connected but no remote store is configured, staying local");
                self.local.clone()
            }
            (AuthStatus::Disconnected, _) => self.local.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    fn local() -> Arc<dyn PersistenceBackend> {
        Arc::new(LocalStore::new(Arc::new(Database::open_memory().unwrap())))
    }

    #[test]
    fn subscription_cancels_on_drop() {
        let token = CancellationToken::new();
        let sub = Subscription::new(token.clone());
        assert!(!token.is_cancelled());
        drop(sub);
        assert!(token.is_cancelled());
    }

    #[test]
    fn selector_follows_auth_status() {
        let selector = BackendSelector::new(local(), ClockState::default())
            .with_transport(Arc::new(MemoryTransport::new()));
        let connected = AuthStatus::Connected { uid: "u1".into() };
        assert_eq!(selector.select(&connected).kind(), BackendKind::Remote);
        assert_eq!(selector.select(&AuthStatus::Disconnected).kind(), BackendKind::Local);
    }

    #[test]
    fn selector_without_transport_stays_local() {
        let selector = BackendSelector::new(local(), ClockState::default());
        let connected = AuthStatus::Connected { uid: "u1".into() };
        assert_eq!(selector.select(&connected).kind(), BackendKind::Local);
    }

    #[test]
    fn auth_status_serializes_tagged() {
        let json = serde_json::to_value(AuthStatus::Connected { uid: "abc".into() }).unwrap();
        assert_eq!(json["status"], "connected");
        assert_eq!(json["uid"], "abc");
    }
}
