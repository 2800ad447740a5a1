//! Threshold alerts: configuration, evaluation, and best-effort delivery.

pub mod dispatch;
pub mod evaluator;
pub mod notify;
pub mod webhook;

pub use self::dispatch::{AlertDispatcher, DispatchError, ScheduledAlert};
pub use self::evaluator::AlertEvaluator;
pub use self::notify::{LogNotifier, Notifier};
pub use self::webhook::WebhookClient;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default webhook timeout.
pub const WEBHOOK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("invalid alert configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Opaque caller-supplied key/value context attached to an alert.
pub type AlertContext = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub variance: f64,
    #[serde(alias = "autocorr")]
    pub autocorrelation: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            variance: 0.7,
            autocorrelation: 0.7,
        }
    }
}

impl Thresholds {
    /// Either dimension alone is enough to fire.
    pub fn exceeded_by(&self, signals: &Signals) -> bool {
        signals.variance >= self.variance || signals.autocorrelation >= self.autocorrelation
    }
}

/// The two indicator values an alert is evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub variance: f64,
    #[serde(alias = "autocorr")]
    pub autocorrelation: f64,
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered {
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
    },
    Failed {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
    },
    Skipped {
        reason: String,
    },
}

impl DeliveryStatus {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DeliveryStatus::Failed { .. })
    }
}

/// Record of the most recent time the thresholds fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub at: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
    pub notification_status: DeliveryStatus,
    pub signals: Signals,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    pub webhook_target: Option<String>,
    pub notify_address: Option<String>,
    pub thresholds: Thresholds,
    pub last_trigger: Option<TriggerRecord>,
}

/// Partial threshold update; omitted fields stay as they are.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ThresholdUpdate {
    pub variance: Option<f64>,
    #[serde(alias = "autocorr")]
    pub autocorrelation: Option<f64>,
}

/// Partial configuration update accepted by [`AlertEvaluator::subscribe`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeRequest {
    #[serde(alias = "webhook_url")]
    pub webhook_target: Option<String>,
    #[serde(alias = "email")]
    pub notify_address: Option<String>,
    pub thresholds: Option<ThresholdUpdate>,
}

/// Body delivered to the webhook and published to the event sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub signals: Signals,
    pub thresholds: Thresholds,
    pub summary: String,
    pub context: AlertContext,
}

/// Result of evaluating one set of signals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<DeliveryStatus>,
}

impl Evaluation {
    pub fn not_triggered() -> Self {
        Self {
            triggered: false,
            delivery: None,
            notification: None,
        }
    }
}
