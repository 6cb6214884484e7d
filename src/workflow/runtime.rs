// Workflow runtime - run claims, durable sleep, terminal bookkeeping
use super::checkpoint::CheckpointStore;
use super::step::StepExecutor;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Terminal outcome of one workflow invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Failed => "failed",
        }
    }
}

/// Sequences checkpointed steps for workflow invocations.
///
/// One runtime is shared across workflows; each invocation gets a
/// `StepExecutor` bound to its run id. Steps within a run execute in
/// declaration order; nothing here parallelizes them.
pub struct WorkflowRuntime {
    store: Arc<dyn CheckpointStore>,
}

impl WorkflowRuntime {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn CheckpointStore> {
        self.store.clone()
    }

    /// Claim the run id and hand back an executor for it.
    ///
    /// Returns None when another executor currently holds the run (duplicate
    /// trigger firing while a run is in flight). Re-invocation after a crash
    /// or completion re-claims and replays through the checkpoints.
    pub async fn begin(
        &self,
        run_id: &str,
        workflow_kind: &str,
    ) -> Result<Option<StepExecutor>, String> {
        if !self.store.try_claim_run(run_id, workflow_kind).await? {
            warn!("🚫 Run '{}' is already in progress, refusing duplicate", run_id);
            return Ok(None);
        }
        info!("🚀 Starting workflow run: {} ({})", run_id, workflow_kind);
        Ok(Some(StepExecutor::new(self.store.clone(), run_id)))
    }

    /// Record the terminal status for a claimed run.
    pub async fn finish(&self, run_id: &str, outcome: RunOutcome) -> Result<(), String> {
        info!("🏁 Workflow run finished: {} ({})", run_id, outcome.as_str());
        self.store.finish_run(run_id, outcome.as_str()).await
    }

    /// Durable sleep: suspend this run for `delay` without holding the wake
    /// deadline only in memory.
    ///
    /// The deadline is persisted before sleeping, keyed by (run id, step id).
    /// A process that crashes mid-sleep and resumes sleeps only the remaining
    /// interval; an already-elapsed deadline is a no-op. While suspended the
    /// run holds no worker beyond the awaiting task itself.
    pub async fn durable_sleep(
        &self,
        run_id: &str,
        step_id: &str,
        delay: std::time::Duration,
    ) -> Result<(), String> {
        let wake_at = match self.store.load_suspension(run_id, step_id).await? {
            Some(existing) => existing,
            None => {
                let deadline = Utc::now()
                    + ChronoDuration::from_std(delay)
                        .map_err(|e| format!("invalid sleep duration: {}", e))?;
                self.store.save_suspension(run_id, step_id, deadline).await?;
                deadline
            }
        };

        let remaining = wake_at - Utc::now();
        if remaining > ChronoDuration::zero() {
            let remaining = remaining
                .to_std()
                .map_err(|e| format!("invalid remaining duration: {}", e))?;
            tokio::time::sleep(remaining).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::checkpoint::MemoryCheckpointStore;

    #[tokio::test]
    async fn duplicate_claim_is_refused_until_finish() {
        let runtime = WorkflowRuntime::new(Arc::new(MemoryCheckpointStore::new()));

        let first = runtime.begin("run-9", "video-intelligence").await.unwrap();
        assert!(first.is_some());

        let second = runtime.begin("run-9", "video-intelligence").await.unwrap();
        assert!(second.is_none());

        runtime.finish("run-9", RunOutcome::Completed).await.unwrap();
        let third = runtime.begin("run-9", "video-intelligence").await.unwrap();
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn crashed_run_claim_expires_and_is_reclaimed() {
        // A crashed process never calls finish; its claim must lapse so a
        // re-invocation can take the run over instead of being refused forever.
        let store = Arc::new(MemoryCheckpointStore::new().with_claim_ttl(ChronoDuration::zero()));

        let runtime = WorkflowRuntime::new(store.clone());
        let first = runtime.begin("run-77", "video-intelligence").await.unwrap();
        assert!(first.is_some());
        drop(first);
        drop(runtime);

        // Simulated restart: a fresh runtime over the same store.
        let resumed = WorkflowRuntime::new(store);
        let second = resumed.begin("run-77", "video-intelligence").await.unwrap();
        assert!(second.is_some(), "expired claim should be re-taken");
    }

    #[tokio::test]
    async fn durable_sleep_honors_persisted_deadline() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let runtime = WorkflowRuntime::new(store.clone());

        // Pre-record an already-elapsed deadline; the sleep must return
        // immediately instead of waiting the full delay again.
        store
            .save_suspension("run-1", "poll-sleep-3", Utc::now() - ChronoDuration::seconds(5))
            .await
            .unwrap();

        let started = std::time::Instant::now();
        runtime
            .durable_sleep("run-1", "poll-sleep-3", std::time::Duration::from_secs(30))
            .await
            .unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }
}
