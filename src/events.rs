//! In-process event sink for alert and metric notifications.
//!
//! Publishing is fire-and-forget: having no subscribers is normal, and a
//! lagging subscriber only loses its own backlog.

use crate::alerts::AlertPayload;
use crate::signals::MetricSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of buffered events per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    AlertFired(AlertPayload),
    MetricsSnapshot {
        species: String,
        latest: MetricSnapshot,
    },
    SeriesRebuilt {
        species: usize,
        built_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<Event>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        if self.tx.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
