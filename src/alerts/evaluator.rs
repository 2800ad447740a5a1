use super::{
    AlertConfig, AlertContext, AlertError, AlertPayload, DeliveryStatus, Evaluation, LogNotifier,
    Notifier, Signals, SubscribeRequest, Thresholds, TriggerRecord, WebhookClient,
};
use crate::events::{Event, EventSink};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

const ALERT_KIND: &str = "tipwatch.alert";
const ALERT_SUMMARY: &str = "Early warning thresholds exceeded";

/// Owns the alert configuration and the last-trigger record.
///
/// `evaluate` never fails: delivery problems are recorded in the returned
/// [`Evaluation`] and in `last_trigger`, not propagated.
pub struct AlertEvaluator {
    config: RwLock<AlertConfig>,
    webhook: WebhookClient,
    notifier: Arc<dyn Notifier>,
    events: Option<EventSink>,
}

impl AlertEvaluator {
    pub fn new(initial: AlertConfig, webhook_timeout: Duration) -> Result<Self, AlertError> {
        Ok(Self {
            config: RwLock::new(initial),
            webhook: WebhookClient::new(webhook_timeout)?,
            notifier: Arc::new(LogNotifier),
            events: None,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    /// Merge the provided fields into the config. Any invalid field rejects
    /// the whole update and leaves the stored config untouched.
    pub async fn subscribe(&self, req: SubscribeRequest) -> Result<AlertConfig, AlertError> {
        let webhook = req.webhook_target.as_deref().map(validate_webhook).transpose()?;
        let address = req.notify_address.as_deref().map(validate_address).transpose()?;
        if let Some(th) = &req.thresholds {
            for (name, value) in [("variance", th.variance), ("autocorrelation", th.autocorrelation)] {
                if let Some(v) = value {
                    validate_threshold(name, v)?;
                }
            }
        }

        let mut config = self.config.write().await;
        if let Some(url) = webhook {
            config.webhook_target = Some(url);
        }
        if let Some(addr) = address {
            config.notify_address = Some(addr);
        }
        if let Some(th) = req.thresholds {
            if let Some(v) = th.variance {
                config.thresholds.variance = v;
            }
            if let Some(a) = th.autocorrelation {
                config.thresholds.autocorrelation = a;
            }
        }

        info!(
            webhook = ?config.webhook_target,
            notify = ?config.notify_address,
            variance = config.thresholds.variance,
            autocorrelation = config.thresholds.autocorrelation,
            "Alert subscription updated"
        );
        Ok(config.clone())
    }

    /// Snapshot of the current configuration, including `last_trigger`.
    pub async fn status(&self) -> AlertConfig {
        self.config.read().await.clone()
    }

    pub async fn evaluate(&self, signals: Signals, context: AlertContext) -> Evaluation {
        // Work from a snapshot so the lock is not held across network calls
        let (thresholds, webhook_target, notify_address) = {
            let config = self.config.read().await;
            (
                config.thresholds,
                config.webhook_target.clone(),
                config.notify_address.clone(),
            )
        };

        if !thresholds.exceeded_by(&signals) {
            debug!(
                variance = signals.variance,
                autocorrelation = signals.autocorrelation,
                "Signals below thresholds"
            );
            return Evaluation::not_triggered();
        }

        let payload = build_payload(signals, thresholds, context);
        warn!(
            alert = %payload.id,
            variance = signals.variance,
            autocorrelation = signals.autocorrelation,
            "Early warning thresholds exceeded"
        );

        let delivery = match webhook_target.as_deref() {
            Some(url) => self.webhook.post(url, &payload).await,
            None => DeliveryStatus::Skipped {
                reason: "no webhook target configured".into(),
            },
        };

        let notification = match notify_address.as_deref() {
            Some(addr) => match self.notifier.notify(addr, &payload).await {
                Ok(()) => DeliveryStatus::Delivered { code: None },
                Err(e) => {
                    warn!(alert = %payload.id, error = %e, "Alert notification failed");
                    DeliveryStatus::Failed {
                        reason: e.to_string(),
                        code: None,
                    }
                }
            },
            None => DeliveryStatus::Skipped {
                reason: "no notify address configured".into(),
            },
        };

        self.config.write().await.last_trigger = Some(TriggerRecord {
            at: payload.timestamp,
            delivery_status: delivery.clone(),
            notification_status: notification.clone(),
            signals,
        });

        if let Some(events) = &self.events {
            events.publish(Event::AlertFired(payload));
        }

        Evaluation {
            triggered: true,
            delivery: Some(delivery),
            notification: Some(notification),
        }
    }
}

fn build_payload(signals: Signals, thresholds: Thresholds, context: AlertContext) -> AlertPayload {
    AlertPayload {
        kind: ALERT_KIND.to_string(),
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        signals,
        thresholds,
        summary: ALERT_SUMMARY.to_string(),
        context,
    }
}

fn validate_webhook(raw: &str) -> Result<String, AlertError> {
    let url = reqwest::Url::parse(raw.trim())
        .map_err(|e| AlertError::InvalidConfig(format!("webhook target {:?}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url.to_string()),
        scheme => Err(AlertError::InvalidConfig(format!(
            "webhook target {:?}: unsupported scheme {:?}",
            raw, scheme
        ))),
    }
}

fn validate_address(raw: &str) -> Result<String, AlertError> {
    let addr = raw.trim();
    match addr.split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() => Ok(addr.to_string()),
        _ => Err(AlertError::InvalidConfig(format!("notify address {:?} is not an email address", raw))),
    }
}

fn validate_threshold(name: &str, value: f64) -> Result<(), AlertError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AlertError::InvalidConfig(format!(
            "{} threshold must be a finite, non-negative number (got {})",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::notify::NotifyError;
    use crate::alerts::ThresholdUpdate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn evaluator() -> AlertEvaluator {
        AlertEvaluator::new(AlertConfig::default(), Duration::from_secs(1)).unwrap()
    }

    fn signals(variance: f64, autocorrelation: f64) -> Signals {
        Signals {
            variance,
            autocorrelation,
        }
    }

    struct CountingNotifier {
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, address: &str, _payload: &AlertPayload) -> Result<(), NotifyError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(NotifyError::Send {
                    address: address.to_string(),
                    reason: "mailbox full".into(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_defaults() {
        let cfg = evaluator().status().await;
        assert_eq!(cfg.thresholds, Thresholds::default());
        assert!(cfg.webhook_target.is_none());
        assert!(cfg.notify_address.is_none());
        assert!(cfg.last_trigger.is_none());
    }

    #[tokio::test]
    async fn test_threshold_or_cases() {
        let ev = evaluator();
        assert!(ev.evaluate(signals(0.9, 0.1), AlertContext::new()).await.triggered);
        assert!(!ev.evaluate(signals(0.5, 0.5), AlertContext::new()).await.triggered);
        assert!(ev.evaluate(signals(0.1, 0.95), AlertContext::new()).await.triggered);
    }

    #[tokio::test]
    async fn test_below_threshold_leaves_last_trigger_alone() {
        let ev = evaluator();
        ev.evaluate(signals(0.2, 0.2), AlertContext::new()).await;
        assert!(ev.status().await.last_trigger.is_none());
    }

    #[tokio::test]
    async fn test_trigger_without_targets_records_skips() {
        let ev = evaluator();
        let out = ev.evaluate(signals(0.8, 0.0), AlertContext::new()).await;
        assert!(out.triggered);
        assert!(matches!(out.delivery, Some(DeliveryStatus::Skipped { .. })));

        let last = ev.status().await.last_trigger.unwrap();
        assert_eq!(last.signals, signals(0.8, 0.0));
        assert!(matches!(last.delivery_status, DeliveryStatus::Skipped { .. }));
        assert!(matches!(last.notification_status, DeliveryStatus::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_subscribe_merges_partially() {
        let ev = evaluator();
        ev.subscribe(SubscribeRequest {
            webhook_target: Some("https://hooks.example.org/tip".into()),
            ..Default::default()
        })
        .await
        .unwrap();

        let cfg = ev
            .subscribe(SubscribeRequest {
                thresholds: Some(ThresholdUpdate {
                    variance: Some(1.5),
                    autocorrelation: None,
                }),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(cfg.webhook_target.as_deref(), Some("https://hooks.example.org/tip"));
        assert_eq!(cfg.thresholds.variance, 1.5);
        assert_eq!(cfg.thresholds.autocorrelation, 0.7);
        assert_eq!(ev.status().await, cfg);
    }

    #[tokio::test]
    async fn test_subscribe_rejects_invalid_and_keeps_config() {
        let ev = evaluator();
        ev.subscribe(SubscribeRequest {
            notify_address: Some("ops@example.org".into()),
            ..Default::default()
        })
        .await
        .unwrap();
        let before = ev.status().await;

        let bad_requests = vec![
            SubscribeRequest {
                webhook_target: Some("not a url".into()),
                notify_address: Some("other@example.org".into()),
                ..Default::default()
            },
            SubscribeRequest {
                webhook_target: Some("ftp://example.org/hook".into()),
                ..Default::default()
            },
            SubscribeRequest {
                notify_address: Some("nobody".into()),
                ..Default::default()
            },
            SubscribeRequest {
                thresholds: Some(ThresholdUpdate {
                    variance: Some(f64::NAN),
                    autocorrelation: Some(0.1),
                }),
                ..Default::default()
            },
            SubscribeRequest {
                thresholds: Some(ThresholdUpdate {
                    variance: None,
                    autocorrelation: Some(-0.5),
                }),
                ..Default::default()
            },
        ];

        for req in bad_requests {
            let err = ev.subscribe(req).await.unwrap_err();
            assert!(matches!(err, AlertError::InvalidConfig(_)));
        }
        assert_eq!(ev.status().await, before);
    }

    #[tokio::test]
    async fn test_notification_is_independent_of_webhook() {
        let notifier = Arc::new(CountingNotifier {
            sent: AtomicUsize::new(0),
            fail: true,
        });
        let ev = evaluator().with_notifier(notifier.clone());
        ev.subscribe(SubscribeRequest {
            notify_address: Some("ops@example.org".into()),
            ..Default::default()
        })
        .await
        .unwrap();

        let out = ev.evaluate(signals(0.1, 0.9), AlertContext::new()).await;
        assert!(out.triggered);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
        assert!(out.notification.unwrap().is_failed());
        assert!(matches!(out.delivery, Some(DeliveryStatus::Skipped { .. })));
    }

    #[tokio::test]
    async fn test_alert_fired_event_carries_context() {
        let sink = EventSink::new(8);
        let mut rx = sink.subscribe();
        let ev = evaluator().with_events(sink);

        let mut ctx = AlertContext::new();
        ctx.insert("species".into(), serde_json::json!("MONARCH"));
        ev.evaluate(signals(0.9, 0.9), ctx).await;

        match rx.recv().await.unwrap() {
            Event::AlertFired(payload) => {
                assert_eq!(payload.kind, ALERT_KIND);
                assert_eq!(payload.context["species"], "MONARCH");
                assert_eq!(payload.thresholds, Thresholds::default());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
