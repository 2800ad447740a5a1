use super::{DetectionEvent, DetectionSource, SourceError};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory detection source.
///
/// Tracks how many times it has been listed, so callers can observe
/// whether a cache actually went back to the source.
pub struct StaticSource {
    events: Mutex<Vec<DetectionEvent>>,
    observed_at: DateTime<Utc>,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(events: Vec<DetectionEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            observed_at: Utc::now(),
            fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A source that is always unreachable.
    pub fn unavailable() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    /// Fallback timestamp for untimed events.
    pub fn with_observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }

    /// Simulated scan latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the event list seen by subsequent scans.
    pub fn replace(&self, events: Vec<DetectionEvent>) {
        if let Ok(mut guard) = self.events.lock() {
            *guard = events;
        }
    }

    /// Number of times `list_events` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DetectionSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn list_events(&self) -> Result<Vec<DetectionEvent>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(SourceError::Unavailable("static source configured to fail".into()));
        }
        let events = self
            .events
            .lock()
            .map_err(|_| SourceError::Unavailable("event list poisoned".into()))?;
        Ok(events.clone())
    }

    fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }
}
