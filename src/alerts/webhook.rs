use super::{AlertError, AlertPayload, DeliveryStatus};
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info, warn};

/// Posts alert payloads to a webhook with a bounded timeout.
#[derive(Clone)]
pub struct WebhookClient {
    client: Client,
}

impl WebhookClient {
    pub fn new(timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tipwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// One POST attempt. Never fails: network errors, timeouts and non-2xx
    /// responses all come back as [`DeliveryStatus::Failed`].
    pub async fn post(&self, url: &str, payload: &AlertPayload) -> DeliveryStatus {
        match self.client.post(url).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                let code = resp.status().as_u16();
                info!(%url, code, alert = %payload.id, "Alert webhook delivered");
                DeliveryStatus::Delivered { code: Some(code) }
            }
            Ok(resp) => {
                let code = resp.status().as_u16();
                warn!(%url, code, alert = %payload.id, "Alert webhook rejected");
                DeliveryStatus::Failed {
                    reason: format!("HTTP {}", resp.status()),
                    code: Some(code),
                }
            }
            Err(e) => {
                let reason = if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    format!("connection failed: {}", e)
                } else {
                    e.to_string()
                };
                error!(%url, alert = %payload.id, %reason, "Alert webhook POST failed");
                DeliveryStatus::Failed { reason, code: None }
            }
        }
    }
}
