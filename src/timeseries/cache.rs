use super::{aggregate_daily, rank_by_volume, SeriesMap};
use crate::events::{Event, EventSink};
use crate::source::DetectionSource;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default cache lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// One complete build. `data` and the stamps are only ever swapped together.
struct Snapshot {
    data: Arc<SeriesMap>,
    built_at: Instant,
    built_at_utc: DateTime<Utc>,
    generation: u64,
}

/// Builds per-species daily series from a detection source and caches them
/// for `ttl`.
///
/// Concurrent callers that find the cache stale share a single rebuild:
/// the rebuild guard is held for the whole scan, and anyone who queued
/// behind it takes the fresh snapshot instead of scanning again.
pub struct TimeSeriesBuilder {
    source: Arc<dyn DetectionSource>,
    ttl: Duration,
    current: RwLock<Option<Arc<Snapshot>>>,
    rebuild_guard: Mutex<()>,
    events: Option<EventSink>,
}

impl TimeSeriesBuilder {
    pub fn new(source: Arc<dyn DetectionSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            current: RwLock::new(None),
            rebuild_guard: Mutex::new(()),
            events: None,
        }
    }

    /// Publish a `series_rebuilt` event after every rebuild.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached series, rebuilding first if the cache is missing,
    /// older than the TTL, or `force_rebuild` is set.
    pub async fn get_or_build(&self, force_rebuild: bool) -> Arc<SeriesMap> {
        self.snapshot(force_rebuild).await.data.clone()
    }

    /// Like [`get_or_build`](Self::get_or_build), paired with the wall-clock
    /// time of the build that produced it.
    pub async fn get_or_build_stamped(&self, force_rebuild: bool) -> (Arc<SeriesMap>, DateTime<Utc>) {
        let snap = self.snapshot(force_rebuild).await;
        (snap.data.clone(), snap.built_at_utc)
    }

    async fn snapshot(&self, force_rebuild: bool) -> Arc<Snapshot> {
        let seen = {
            let current = self.current.read().await;
            if let Some(snap) = current.as_ref() {
                if !force_rebuild && self.is_fresh(snap) {
                    return snap.clone();
                }
            }
            current.as_ref().map(|s| s.generation)
        };

        let _guard = self.rebuild_guard.lock().await;

        let next_generation = {
            let current = self.current.read().await;
            if let Some(snap) = current.as_ref() {
                if Some(snap.generation) != seen {
                    debug!(generation = snap.generation, "Joined in-flight rebuild");
                    return snap.clone();
                }
                if !force_rebuild && self.is_fresh(snap) {
                    return snap.clone();
                }
            }
            seen.map_or(1, |g| g + 1)
        };

        let snap = Arc::new(self.rebuild(next_generation).await);
        *self.current.write().await = Some(snap.clone());
        snap
    }

    /// Wall-clock time of the last completed build.
    pub async fn built_at(&self) -> Option<DateTime<Utc>> {
        self.current.read().await.as_ref().map(|s| s.built_at_utc)
    }

    /// Top `n` species by total detections, using the cache.
    pub async fn top_species_by_volume(&self, n: usize) -> Vec<(String, u64)> {
        let series = self.get_or_build(false).await;
        rank_by_volume(&series, n)
    }

    fn is_fresh(&self, snap: &Snapshot) -> bool {
        snap.built_at.elapsed() < self.ttl
    }

    async fn rebuild(&self, generation: u64) -> Snapshot {
        let started = Instant::now();
        let data = match self.source.list_events().await {
            Ok(events) => aggregate_daily(&events, self.source.observed_at()),
            Err(e) => {
                // Absence of data is not an error; an empty build is cached for the TTL
                warn!(source = self.source.name(), error = %e, "Detection source unavailable, caching empty series");
                SeriesMap::new()
            }
        };

        let built_at_utc = Utc::now();
        info!(
            source = self.source.name(),
            species = data.len(),
            generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rebuilt daily time series"
        );

        if let Some(events) = &self.events {
            events.publish(Event::SeriesRebuilt {
                species: data.len(),
                built_at: built_at_utc,
            });
        }

        Snapshot {
            data: Arc::new(data),
            built_at: Instant::now(),
            built_at_utc,
            generation,
        }
    }
}
