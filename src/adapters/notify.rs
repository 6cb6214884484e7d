// Outbound notifications (webhook delivery)
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::info;

/// Notification events emitted by workflows. Formatting for a specific
/// channel (Slack, email) happens on the receiving side.
#[derive(Debug, Clone)]
pub enum Notification {
    VideoProcessed {
        video_id: String,
        title: String,
        duration_seconds: f64,
    },
    VideoFailed {
        video_id: String,
        error: String,
    },
    ServiceUnhealthy {
        service_name: String,
        error: String,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), PipelineError>;
}

/// Webhook notifier: one POST per event.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("NOTIFY_WEBHOOK_URL").ok().map(Self::new)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), PipelineError> {
        let payload = match notification {
            Notification::VideoProcessed {
                video_id,
                title,
                duration_seconds,
            } => json!({
                "event": "video.processed",
                "video_id": video_id,
                "title": title,
                "duration_seconds": duration_seconds,
            }),
            Notification::VideoFailed { video_id, error } => json!({
                "event": "video.failed",
                "video_id": video_id,
                "error": error,
            }),
            Notification::ServiceUnhealthy {
                service_name,
                error,
            } => json!({
                "event": "service.unhealthy",
                "service": service_name,
                "error": error,
            }),
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::service("notify", e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::service(
                "notify",
                format!("webhook returned {}", response.status()),
            ));
        }

        info!("🔔 Notification delivered: {}", payload["event"]);
        Ok(())
    }
}
