// Failure handoff - terminal step for unrecoverable run failures
use crate::adapters::notify::{Notification, Notifier};
use crate::error::PipelineError;
use crate::store::VideoStore;
use std::sync::Arc;
use tracing::{error, warn};

/// Invoked on any unrecoverable failure: persists the `failed` status with
/// the error message and emits a failure notification. This is the only
/// failure surface external observers see.
pub struct FailureHandoff {
    store: Arc<dyn VideoStore>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl FailureHandoff {
    pub fn new(store: Arc<dyn VideoStore>, notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self { store, notifier }
    }

    pub async fn handle(&self, video_id: &str, cause: &PipelineError) {
        // Matched exhaustively so a new error kind forces a decision here.
        match cause {
            PipelineError::MissingConfiguration(what) => {
                error!("❌ Run for video {} aborted: deployment misconfigured ({})", video_id, what)
            }
            PipelineError::NotFound(what) => {
                error!("❌ Run for video {} aborted: {} not found", video_id, what)
            }
            PipelineError::FatalStep { step, message } => {
                error!("❌ Run for video {} aborted at step '{}': {}", video_id, step, message)
            }
            PipelineError::StepFailed { step, message } => {
                error!("❌ Run for video {} failed at step '{}': {}", video_id, step, message)
            }
            PipelineError::Service { service, message } => {
                error!("❌ Run for video {} failed: {} error: {}", video_id, service, message)
            }
            PipelineError::DiarizationTimeout { attempts } => {
                error!("❌ Run for video {} failed: diarization timeout ({} polls)", video_id, attempts)
            }
            PipelineError::Database(message) => {
                error!("❌ Run for video {} failed: database error: {}", video_id, message)
            }
            PipelineError::Serialization(message) => {
                error!("❌ Run for video {} failed: serialization error: {}", video_id, message)
            }
        }

        if let Err(e) = self.store.set_failed(video_id, &cause.to_string()).await {
            // The status write is itself best-effort here; the run is already
            // lost and the caller still gets the structured failure.
            warn!("⚠️ Failed to persist failed status for video {}: {}", video_id, e);
        }

        if let Some(notifier) = &self.notifier {
            let notification = Notification::VideoFailed {
                video_id: video_id.to_string(),
                error: cause.to_string(),
            };
            if let Err(e) = notifier.notify(&notification).await {
                warn!("⚠️ Failed to deliver failure notification: {}", e);
            }
        }
    }
}
