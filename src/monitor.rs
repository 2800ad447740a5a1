//! Periodic background refresh of per-species indicators.

use crate::alerts::{AlertContext, AlertDispatcher, Signals};
use crate::config::MonitorConfig;
use crate::events::{Event, EventSink};
use crate::signals::{compute_metrics, MetricParams, MetricSnapshot};
use crate::timeseries::{rank_by_volume, TimeSeriesBuilder};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Monitor {
    builder: Arc<TimeSeriesBuilder>,
    dispatcher: AlertDispatcher,
    events: EventSink,
    params: MetricParams,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(
        builder: Arc<TimeSeriesBuilder>,
        dispatcher: AlertDispatcher,
        events: EventSink,
        params: MetricParams,
        config: MonitorConfig,
    ) -> Self {
        Self {
            builder,
            dispatcher,
            events,
            params,
            config,
        }
    }

    /// One pass: refresh (if stale), compute the top species, publish snapshots.
    pub async fn run_once(&self) -> Vec<(String, MetricSnapshot)> {
        let series = self.builder.get_or_build(false).await;
        let mut snapshots = Vec::new();

        for (species, _total) in rank_by_volume(&series, self.config.top_n) {
            let Some(latest) = compute_metrics(&series[&species], &self.params).latest() else {
                continue;
            };
            debug!(%species, risk = latest.risk, "Monitor snapshot");

            self.events.publish(Event::MetricsSnapshot {
                species: species.clone(),
                latest,
            });

            if self.config.auto_evaluate {
                let mut context = AlertContext::new();
                context.insert("source".into(), json!("monitor"));
                context.insert("species".into(), json!(species));
                context.insert("date".into(), json!(latest.date));
                context.insert("risk".into(), json!(latest.risk));
                let signals = Signals {
                    variance: latest.variance,
                    autocorrelation: latest.autocorrelation,
                };
                if let Err(e) = self.dispatcher.schedule(signals, context) {
                    warn!(%species, error = %e, "Monitor could not schedule alert evaluation");
                }
            }

            snapshots.push((species, latest));
        }

        snapshots
    }
}

/// Main monitor loop. Runs until the runtime shuts down.
pub async fn run_monitor_loop(monitor: Monitor) {
    let period = Duration::from_secs(monitor.config.interval_secs.max(1));
    info!(interval_secs = period.as_secs(), top_n = monitor.config.top_n, "Monitor started");

    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let snapshots = monitor.run_once().await;
        info!(species = snapshots.len(), "Monitor pass complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertConfig, AlertEvaluator, Thresholds};
    use crate::source::{DetectionEvent, StaticSource};
    use crate::timeseries::cache::DEFAULT_TTL;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn events() -> Vec<DetectionEvent> {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let mut out = Vec::new();
        for day in 0..20 {
            for _ in 0..(day % 4 + 1) {
                out.push(DetectionEvent::new("A", t0 + ChronoDuration::days(day)));
            }
        }
        out.push(DetectionEvent::new("B", t0));
        out
    }

    #[tokio::test]
    async fn test_run_once_publishes_top_species() {
        let sink = EventSink::new(16);
        let mut rx = sink.subscribe();
        let builder = Arc::new(TimeSeriesBuilder::new(Arc::new(StaticSource::new(events())), DEFAULT_TTL));
        let evaluator = Arc::new(AlertEvaluator::new(AlertConfig::default(), Duration::from_secs(1)).unwrap());
        let dispatcher = AlertDispatcher::spawn(evaluator.clone(), 8, 1);

        let monitor = Monitor::new(
            builder,
            dispatcher,
            sink,
            MetricParams::default(),
            MonitorConfig {
                top_n: 1,
                ..MonitorConfig::default()
            },
        );

        let snapshots = monitor.run_once().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].0, "A");

        match rx.recv().await.unwrap() {
            Event::MetricsSnapshot { species, latest } => {
                assert_eq!(species, "A");
                assert!((0.0..=100.0).contains(&latest.risk));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        // auto_evaluate is off, so nothing was scheduled
        tokio::task::yield_now().await;
        assert!(evaluator.status().await.last_trigger.is_none());
    }

    #[tokio::test]
    async fn test_auto_evaluate_schedules_alerts() {
        let alert_sink = EventSink::new(16);
        let mut alerts = alert_sink.subscribe();
        // Zero thresholds so the latest signals always fire
        let initial = AlertConfig {
            thresholds: Thresholds {
                variance: 0.0,
                autocorrelation: 0.0,
            },
            ..AlertConfig::default()
        };
        let evaluator = Arc::new(
            AlertEvaluator::new(initial, Duration::from_secs(1))
                .unwrap()
                .with_events(alert_sink),
        );
        let dispatcher = AlertDispatcher::spawn(evaluator.clone(), 8, 1);
        let builder = Arc::new(TimeSeriesBuilder::new(Arc::new(StaticSource::new(events())), DEFAULT_TTL));

        let monitor = Monitor::new(
            builder,
            dispatcher,
            EventSink::new(16),
            MetricParams::default(),
            MonitorConfig {
                top_n: 1,
                auto_evaluate: true,
                ..MonitorConfig::default()
            },
        );
        let snapshots = monitor.run_once().await;
        let latest = snapshots[0].1;

        let payload = match tokio::time::timeout(Duration::from_secs(5), alerts.recv()).await {
            Ok(Ok(Event::AlertFired(payload))) => payload,
            other => panic!("expected alert_fired, got {:?}", other),
        };
        assert_eq!(payload.context["source"], "monitor");
        assert_eq!(payload.context["species"], "A");
        assert_eq!(payload.signals.variance, latest.variance);

        let trigger = evaluator.status().await.last_trigger.expect("trigger recorded");
        assert_eq!(trigger.signals.autocorrelation, latest.autocorrelation);
    }
}
