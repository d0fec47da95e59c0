//! Cloud-synced store.
//!
//! State lives in one JSON document per identity at
//! `users/{uid}/clock_state`. Conflicts across devices resolve by whichever
//! write lands last; the overwritten device is not told.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::state::ClockState;

use super::{BackendKind, PersistenceBackend, StateSink, Subscription};

/// Document transport behind [`RemoteSyncStore`].
///
/// `origin` identifies the writing client so that a watcher does not
/// receive its own writes back.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn put(&self, path: &str, doc: &Value, origin: &str) -> Result<(), StoreError>;

    /// Forward documents written to `path` by other origins into `sink`
    /// until `cancel` fires.
    fn watch(
        &self,
        path: &str,
        origin: &str,
        sink: mpsc::UnboundedSender<Value>,
        cancel: CancellationToken,
    );
}

#[derive(Debug, Clone)]
struct DocumentWrite {
    path: String,
    origin: String,
    doc: Value,
}

/// In-process document hub shared by every store created over it.
///
/// Clones share the same documents, so two stores over clones of one
/// transport behave like two devices signed into the same account.
#[derive(Clone)]
pub struct MemoryTransport {
    docs: Arc<Mutex<HashMap<String, Value>>>,
    changes: broadcast::Sender<DocumentWrite>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            docs: Arc::new(Mutex::new(HashMap::new())),
            changes,
        }
    }

    fn docs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, StoreError> {
        self.docs
            .lock()
            .map_err(|_| StoreError::Unavailable("document hub lock poisoned".into()))
    }
}

#[async_trait]
impl RemoteTransport for MemoryTransport {
    async fn fetch(&self, path: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.docs()?.get(path).cloned())
    }

    async fn put(&self, path: &str, doc: &Value, origin: &str) -> Result<(), StoreError> {
        self.docs()?.insert(path.to_string(), doc.clone());
        // No receivers is fine: nobody is watching.
        let _ = self.changes.send(DocumentWrite {
            path: path.to_string(),
            origin: origin.to_string(),
            doc: doc.clone(),
        });
        Ok(())
    }

    fn watch(
        &self,
        path: &str,
        origin: &str,
        sink: mpsc::UnboundedSender<Value>,
        cancel: CancellationToken,
    ) {
        let mut rx = self.changes.subscribe();
        let path = path.to_string();
        let origin = origin.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    change = rx.recv() => match change {
                        Ok(write) if write.path == path && write.origin != origin => {
                            if sink.send(write.doc).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("remote watcher lagged, skipped {skipped} writes");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("remote watcher for {path} stopped");
        });
    }
}

/// Remote backend for one signed-in identity.
pub struct RemoteSyncStore {
    transport: Arc<dyn RemoteTransport>,
    uid: String,
    origin: String,
    defaults: ClockState,
}

impl RemoteSyncStore {
    pub fn new(transport: Arc<dyn RemoteTransport>, uid: &str) -> Self {
        Self {
            transport,
            uid: uid.to_string(),
            origin: Uuid::new_v4().to_string(),
            defaults: ClockState::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: ClockState) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn document_path(&self) -> String {
        format!("users/{}/clock_state", self.uid)
    }
}

#[async_trait]
impl PersistenceBackend for RemoteSyncStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn load(&self) -> Result<ClockState, StoreError> {
        let doc = self.transport.fetch(&self.document_path()).await?;
        Ok(match doc {
            Some(doc) => ClockState::from_value(&doc),
            None => self.defaults.clone(),
        })
    }

    async fn save(&self, state: &ClockState) -> Result<(), StoreError> {
        let doc = serde_json::to_value(state)?;
        self.transport
            .put(&self.document_path(), &doc, &self.origin)
            .await
    }

    fn subscribe(&self, sink: StateSink) -> Subscription {
        let cancel = CancellationToken::new();
        let (doc_tx, mut doc_rx) = mpsc::unbounded_channel::<Value>();
        self.transport
            .watch(&self.document_path(), &self.origin, doc_tx, cancel.clone());

        let stop = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    doc = doc_rx.recv() => match doc {
                        Some(doc) => {
                            if sink.send(ClockState::from_value(&doc)).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Subscription::new(cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn device(hub: &MemoryTransport, uid: &str) -> RemoteSyncStore {
        RemoteSyncStore::new(Arc::new(hub.clone()), uid)
    }

    #[tokio::test]
    async fn missing_document_loads_defaults() {
        let hub = MemoryTransport::new();
        let store = device(&hub, "u1").with_defaults(ClockState::with_defaults(45, 120));
        let state = store.load().await.unwrap();
        assert_eq!(state.focus.duration_minutes, 45);
        assert_eq!(state.countdown.duration_seconds, 120);
    }

    #[tokio::test]
    async fn documents_are_namespaced_per_identity() {
        let hub = MemoryTransport::new();
        let alice = device(&hub, "alice");
        let bob = device(&hub, "bob");

        let mut state = ClockState::default();
        state.focus.duration_minutes = 5;
        alice.save(&state).await.unwrap();

        assert_eq!(alice.load().await.unwrap().focus.duration_minutes, 5);
        assert_eq!(bob.load().await.unwrap(), ClockState::default());
        assert_eq!(alice.document_path(), "users/alice/clock_state");
    }

    #[tokio::test]
    async fn other_device_writes_are_pushed() {
        let hub = MemoryTransport::new();
        let laptop = device(&hub, "u1");
        let phone = device(&hub, "u1");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = laptop.subscribe(tx);

        let mut state = ClockState::default();
        state.countdown.duration_seconds = 99;
        phone.save(&state).await.unwrap();

        let pushed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pushed.countdown.duration_seconds, 99);
    }

    #[tokio::test]
    async fn own_writes_are_not_echoed() {
        let hub = MemoryTransport::new();
        let laptop = device(&hub, "u1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = laptop.subscribe(tx);

        laptop.save(&ClockState::default()).await.unwrap();
        let echoed = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(echoed.is_err());
    }

    #[tokio::test]
    async fn cancelled_subscription_stops_delivery() {
        let hub = MemoryTransport::new();
        let laptop = device(&hub, "u1");
        let phone = device(&hub, "u1");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = laptop.subscribe(tx);
        sub.cancel();
        tokio::task::yield_now().await;

        phone.save(&ClockState::default()).await.unwrap();
        let delivered = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(!matches!(delivered, Ok(Some(_))));
    }
}
