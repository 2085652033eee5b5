//! Host-facing update events.
//!
//! Every wakeup reports through an [`EventSink`]: one `Updated` or `Error`
//! per processed resource, `Progress` while bodies stream, and a single
//! `Error` without a URI when the wakeup itself fails.

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::proxy::ProgressListener;
use crate::resource::ResourceUri;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Updated {
        manager: String,
        uri: String,
    },
    Error {
        manager: String,
        uri: Option<String>,
        message: String,
    },
    Progress {
        manager: String,
        uri: String,
        bytes_read: u64,
        bytes_total: i64,
        bytes_per_second: i64,
    },
}

impl SyncEvent {
    pub fn manager(&self) -> &str {
        match self {
            SyncEvent::Updated { manager, .. }
            | SyncEvent::Error { manager, .. }
            | SyncEvent::Progress { manager, .. } => manager,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            SyncEvent::Updated { uri, .. } | SyncEvent::Progress { uri, .. } => Some(uri),
            SyncEvent::Error { uri, .. } => uri.as_deref(),
        }
    }

    /// True for `Updated` and `Error`, the events that finish a resource.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncEvent::Progress { .. })
    }
}

/// Destination for update events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);
}

/// Forwards events into a tokio channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<SyncEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: SyncEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

/// Writes events to the log.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: SyncEvent) {
        match event {
            SyncEvent::Updated { manager, uri } => {
                info!(manager = %manager, uri = %uri, "Resource updated")
            }
            SyncEvent::Error {
                manager,
                uri,
                message,
            } => warn!(
                manager = %manager,
                uri = uri.as_deref().unwrap_or("-"),
                error = %message,
                "Update error"
            ),
            SyncEvent::Progress { .. } => {}
        }
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    pub fn terminal_events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.is_terminal())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: SyncEvent) {
        self.events.lock().push(event);
    }
}

/// Tags events with one manager name.
#[derive(Clone, Copy)]
pub struct ManagerEvents<'a> {
    manager: &'a str,
    sink: &'a dyn EventSink,
}

impl<'a> ManagerEvents<'a> {
    pub fn new(manager: &'a str, sink: &'a dyn EventSink) -> Self {
        Self { manager, sink }
    }

    pub fn manager(&self) -> &str {
        self.manager
    }

    pub fn updated(&self, uri: &ResourceUri) {
        self.sink.emit(SyncEvent::Updated {
            manager: self.manager.to_string(),
            uri: uri.to_string(),
        });
    }

    pub fn error(&self, uri: Option<&ResourceUri>, message: impl Into<String>) {
        self.sink.emit(SyncEvent::Error {
            manager: self.manager.to_string(),
            uri: uri.map(|u| u.to_string()),
            message: message.into(),
        });
    }
}

impl ProgressListener for ManagerEvents<'_> {
    fn on_progress(
        &self,
        uri: &ResourceUri,
        bytes_read: u64,
        bytes_total: i64,
        bytes_per_second: i64,
    ) {
        self.sink.emit(SyncEvent::Progress {
            manager: self.manager.to_string(),
            uri: uri.to_string(),
            bytes_read,
            bytes_total,
            bytes_per_second,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_events_are_tagged() {
        let sink = RecordingSink::new();
        let events = ManagerEvents::new("news", &sink);
        let uri = ResourceUri::new("/a").unwrap();

        events.on_progress(&uri, 10, -1, -1);
        events.updated(&uri);
        events.error(None, "boom");

        let all = sink.events();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|e| e.manager() == "news"));
        assert_eq!(sink.terminal_events().len(), 2);
        assert_eq!(all[2].uri(), None);
    }

    #[test]
    fn test_event_json_shape() {
        let event = SyncEvent::Updated {
            manager: "m".into(),
            uri: "/a".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"updated","manager":"m","uri":"/a"}"#);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.emit(SyncEvent::Error {
            manager: "m".into(),
            uri: None,
            message: "x".into(),
        });
        let event = rx.recv().await.unwrap();
        assert!(event.is_terminal());
    }
}
