//! HTTP document store transport.
//!
//! Documents are plain JSON resources: `GET {base}/{path}` reads,
//! `PUT {base}/{path}` replaces. There is no push channel over plain HTTP,
//! so `watch` polls and forwards documents that changed since the last
//! poll and that this client did not write itself.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::StoreError;

use super::RemoteTransport;

/// Own writes remembered per path. A poll can observe any write still
/// in flight, not only the latest.
const RECENT_WRITES: usize = 16;

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
    poll_interval: Duration,
    own_writes: Arc<Mutex<HashMap<String, VecDeque<Value>>>>,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: Option<String>, poll_interval: Duration) -> Result<Self, StoreError> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base: Url::parse(&base)?,
            token,
            poll_interval,
            own_writes: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn remember_write(&self, path: &str, doc: &Value) {
        if let Ok(mut written) = self.own_writes.lock() {
            let recent = written.entry(path.to_string()).or_default();
            if recent.len() == RECENT_WRITES {
                recent.pop_front();
            }
            recent.push_back(doc.clone());
        }
    }

    fn wrote(&self, path: &str, doc: &Value) -> bool {
        self.own_writes
            .lock()
            .ok()
            .and_then(|written| written.get(path).map(|recent| recent.contains(doc)))
            .unwrap_or(false)
    }
}

/// A polled document is worth pushing only if it is new to this watcher
/// and is not one of this client's recent writes.
fn is_foreign_change(doc: &Value, last_seen: Option<&Value>, own_write: bool) -> bool {
    last_seen != Some(doc) && !own_write
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn fetch(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let response = self
            .authorized(self.client.get(self.url(path)?))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<Value>().await?)),
            status => Err(StoreError::Status {
                code: status.as_u16(),
                path: path.to_string(),
            }),
        }
    }

    async fn put(&self, path: &str, doc: &Value, _origin: &str) -> Result<(), StoreError> {
        // Recorded before sending so a poll racing the request does not
        // mistake this write for a foreign one.
        self.remember_write(path, doc);
        let response = self
            .authorized(self.client.put(self.url(path)?))
            .json(doc)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StoreError::Status {
                code: response.status().as_u16(),
                path: path.to_string(),
            });
        }
        Ok(())
    }

    fn watch(
        &self,
        path: &str,
        _origin: &str,
        sink: mpsc::UnboundedSender<Value>,
        cancel: CancellationToken,
    ) {
        let transport = self.clone();
        let path = path.to_string();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(transport.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First poll only records what is there; the caller has just
            // loaded it.
            let mut last_seen: Option<Value> = None;
            let mut seeded = false;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let doc = match transport.fetch(&path).await {
                    Ok(Some(doc)) => doc,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("polling {path} failed: {e}");
                        continue;
                    }
                };

                if seeded
                    && is_foreign_change(&doc, last_seen.as_ref(), transport.wrote(&path, &doc))
                    && sink.send(doc.clone()).is_err()
                {
                    break;
                }
                seeded = true;
                last_seen = Some(doc);
            }
            debug!("http watcher for {path} stopped");
        });
    }
}
