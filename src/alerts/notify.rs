use super::AlertPayload;
use thiserror::Error;
use tracing::info;

/// Longest payload excerpt included in a notification body.
const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to render notification: {0}")]
    Render(#[from] serde_json::Error),

    #[error("notification to {address} failed: {reason}")]
    Send { address: String, reason: String },
}

/// Secondary alert channel (e.g. email), independent of the webhook.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, address: &str, payload: &AlertPayload) -> Result<(), NotifyError>;
}

/// Writes the notification to the log instead of sending it.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, address: &str, payload: &AlertPayload) -> Result<(), NotifyError> {
        let body = serde_json::to_string(payload)?;
        let excerpt: String = body.chars().take(EXCERPT_CHARS).collect();
        info!(%address, alert = %payload.id, payload = %excerpt, "Simulated alert email sent");
        Ok(())
    }
}
