//! Activity notifications for a logging collaborator.
//!
//! Every action, completion and persistence failure becomes an
//! [`ActivityEvent`]. The engine sends them over an optional channel and
//! mirrors each one to `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub source: String,
    pub message: String,
    pub severity: Severity,
    /// Whether the write behind this event went to the cloud store.
    pub cloud_backed: bool,
    pub at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn from_event(event: &Event, cloud_backed: bool) -> Self {
        Self {
            source: event.source().to_string(),
            message: event.message(),
            severity: Severity::Info,
            cloud_backed,
            at: event.at(),
        }
    }

    pub fn warning(source: &str, message: impl Into<String>, cloud_backed: bool, at: DateTime<Utc>) -> Self {
        Self {
            source: source.to_string(),
            message: message.into(),
            severity: Severity::Warning,
            cloud_backed,
            at,
        }
    }
}

/// Fan-out point for activity events. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    sink: Option<mpsc::UnboundedSender<ActivityEvent>>,
}

impl ActivityLog {
    pub fn new(sink: Option<mpsc::UnboundedSender<ActivityEvent>>) -> Self {
        Self { sink }
    }

    pub fn record(&self, activity: ActivityEvent) {
        match activity.severity {
            Severity::Info => info!(
                source = %activity.source,
                cloud = activity.cloud_backed,
                "{}",
                activity.message
            ),
            Severity::Warning => warn!(
                source = %activity.source,
                cloud = activity.cloud_backed,
                "{}",
                activity.message
            ),
            Severity::Error => error!(
                source = %activity.source,
                cloud = activity.cloud_backed,
                "{}",
                activity.message
            ),
        }
        if let Some(sink) = &self.sink {
            // A dropped receiver only means nobody is listening anymore.
            let _ = sink.send(activity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_become_info_activity() {
        let event = Event::FocusReset { at: Utc::now() };
        let activity = ActivityEvent::from_event(&event, true);
        assert_eq!(activity.source, "focus");
        assert_eq!(activity.severity, Severity::Info);
        assert!(activity.cloud_backed);
    }

    #[test]
    fn record_forwards_to_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let log = ActivityLog::new(Some(tx));
        log.record(ActivityEvent::warning("sync", "write failed", false, Utc::now()));
        let received = rx.try_recv().unwrap();
        assert_eq!(received.severity, Severity::Warning);
        assert_eq!(received.message, "write failed");
    }

    #[test]
    fn record_without_sink_is_fine() {
        ActivityLog::default().record(ActivityEvent::warning("sync", "x", false, Utc::now()));
    }
}
