//! Event bus for lifecycle notifications
//!
//! Pub/sub over a Tokio broadcast channel with an optional JSON-lines
//! journal for later inspection.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::LifecycleEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Failed to persist event: {0}")]
    PersistFailed(String),

    #[error("Journal lock poisoned")]
    LockPoisoned,
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels and optional journaling
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,

    /// Append-only journal file, one JSON event per line
    journal: Option<Mutex<PathBuf>>,
}

impl EventBus {
    /// Create a new event bus without a journal
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            journal: None,
        }
    }

    /// Create an event bus that also appends every event to `path`
    pub fn with_journal(path: impl Into<PathBuf>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            journal: Some(Mutex::new(path.into())),
        }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers, then journal it.
    ///
    /// Returns the number of receivers that got the event. Having no
    /// subscribers is not an error. A journal failure is reported after
    /// live subscribers have already received the event.
    pub fn publish(&self, event: LifecycleEvent) -> EventBusResult<usize> {
        let event_type = event.event_type();

        let receivers = match self.sender.send(event.clone()) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
                count
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
                0
            }
        };

        if let Some(journal) = &self.journal {
            let path = journal.lock().map_err(|_| EventBusError::LockPoisoned)?;
            if let Err(e) = Self::append_line(&path, &event) {
                warn!(event_type, issue_id = event.issue_id(), "Failed to journal event: {}", e);
                return Err(e);
            }
        }

        Ok(receivers)
    }

    fn append_line(path: &PathBuf, event: &LifecycleEvent) -> EventBusResult<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| EventBusError::PersistFailed(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| EventBusError::PersistFailed(e.to_string()))?;
        writeln!(file, "{}", line).map_err(|e| EventBusError::PersistFailed(e.to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Subscribe, yielding only events that match `filter`
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub issue_id: Option<String>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(mut self, issue_id: &str) -> Self {
        self.issue_id = Some(issue_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        if let Some(ref id) = self.issue_id {
            if event.issue_id() != id {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<LifecycleEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<LifecycleEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<LifecycleEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}
