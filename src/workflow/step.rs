// Step executor - checkpoint-read-or-execute-and-write semantics
use super::checkpoint::CheckpointStore;
use crate::error::PipelineError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Uniform result of one step execution.
///
/// Drives whether the workflow continues, short-circuits to failure handling,
/// or aborts the run entirely.
#[derive(Debug, Clone)]
pub enum StepResult<T> {
    Success(T),
    RecoverableFailure(String),
    FatalFailure(String),
}

impl<T> StepResult<T> {
    /// Convert into a typed result for a required stage: fatal stays fatal,
    /// recoverable becomes recoverable-terminal for this run.
    pub fn required(self, step_id: &str) -> Result<T, PipelineError> {
        match self {
            StepResult::Success(value) => Ok(value),
            StepResult::FatalFailure(message) => Err(PipelineError::FatalStep {
                step: step_id.to_string(),
                message,
            }),
            StepResult::RecoverableFailure(message) => Err(PipelineError::StepFailed {
                step: step_id.to_string(),
                message,
            }),
        }
    }

    /// Convert into a typed result for an optional stage: recoverable
    /// failures degrade to the fallback, fatal failures still abort.
    pub fn optional(self, step_id: &str, fallback: T) -> Result<T, PipelineError> {
        match self {
            StepResult::Success(value) => Ok(value),
            StepResult::FatalFailure(message) => Err(PipelineError::FatalStep {
                step: step_id.to_string(),
                message,
            }),
            StepResult::RecoverableFailure(message) => {
                warn!("⚠️ Optional step '{}' degraded: {}", step_id, message);
                Ok(fallback)
            }
        }
    }
}

/// Wraps units of work with replay-safe checkpoint semantics.
///
/// Before running the closure, the executor looks for an existing record for
/// (run_id, step_id). A stored output with a matching input hash is returned
/// without re-invoking the closure, so side-effecting calls (uploads, paid
/// AI requests) never repeat after a resume. Successful outputs are written
/// before returning: a crash immediately after success cannot cause a
/// duplicate execution.
pub struct StepExecutor {
    store: Arc<dyn CheckpointStore>,
    run_id: String,
}

impl StepExecutor {
    pub fn new(store: Arc<dyn CheckpointStore>, run_id: impl Into<String>) -> Self {
        Self {
            store,
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn store(&self) -> Arc<dyn CheckpointStore> {
        self.store.clone()
    }

    /// Execute one step, or replay its recorded output.
    ///
    /// The executor does not retry recoverable failures itself; retry policy
    /// belongs to the workflow definition. Failures are still recorded so a
    /// resumed run re-enters the stage instead of silently skipping it.
    pub async fn execute<I, T, F, Fut>(
        &self,
        step_id: &str,
        input: &I,
        f: F,
    ) -> StepResult<T>
    where
        I: Serialize,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let input_hash = match hash_input(input) {
            Ok(hash) => hash,
            Err(e) => return StepResult::RecoverableFailure(e),
        };

        // Checkpoint read happens before any side-effecting call.
        match self.store.load(&self.run_id, step_id).await {
            Ok(Some(record)) if record.output.is_some() && record.input_hash == input_hash => {
                info!("⏩ Replaying step '{}' from checkpoint", step_id);
                match serde_json::from_value(record.output.unwrap_or(serde_json::Value::Null)) {
                    Ok(value) => return StepResult::Success(value),
                    Err(e) => {
                        // Corrupt or schema-drifted record: fall through and
                        // re-execute rather than fail the run on a stale row.
                        warn!("⚠️ Step '{}' checkpoint unreadable ({}), re-executing", step_id, e);
                    }
                }
            }
            Ok(Some(record)) if record.error.is_some() => {
                info!("🔁 Step '{}' previously failed, re-executing", step_id);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("⚠️ Checkpoint lookup failed for step '{}': {}", step_id, e);
            }
        }

        match f().await {
            Ok(value) => {
                let output = match serde_json::to_value(&value) {
                    Ok(json) => json,
                    Err(e) => {
                        return StepResult::RecoverableFailure(format!(
                            "failed to serialize output of step '{}': {}",
                            step_id, e
                        ))
                    }
                };
                // Write-before-return.
                if let Err(e) = self
                    .store
                    .save_success(&self.run_id, step_id, &input_hash, &output)
                    .await
                {
                    return StepResult::RecoverableFailure(format!(
                        "step '{}' succeeded but checkpoint write failed: {}",
                        step_id, e
                    ));
                }
                info!("💾 Step '{}' completed and checkpointed", step_id);
                StepResult::Success(value)
            }
            Err(e) if e.is_fatal() => {
                let message = e.to_string();
                if let Err(save_err) = self
                    .store
                    .save_failure(&self.run_id, step_id, &input_hash, &message)
                    .await
                {
                    warn!("⚠️ Failed to record fatal step failure: {}", save_err);
                }
                StepResult::FatalFailure(message)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(save_err) = self
                    .store
                    .save_failure(&self.run_id, step_id, &input_hash, &message)
                    .await
                {
                    warn!("⚠️ Failed to record step failure: {}", save_err);
                }
                StepResult::RecoverableFailure(message)
            }
        }
    }
}

/// Hash a step input to its canonical JSON digest.
fn hash_input<I: Serialize>(input: &I) -> Result<String, String> {
    let json = serde_json::to_vec(input).map_err(|e| format!("failed to hash step input: {}", e))?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::checkpoint::MemoryCheckpointStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn replays_recorded_output_without_reinvoking() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let executor = StepExecutor::new(store, "run-1");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let result: StepResult<i32> = executor
                .execute("double", &21, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            match result {
                StepResult::Success(v) => assert_eq!(v, 42),
                other => panic!("unexpected result: {:?}", other),
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn changed_input_hash_re_executes() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let executor = StepExecutor::new(store.clone(), "run-1");

        let first: StepResult<String> = executor
            .execute("greet", &"alice", || async { Ok("hi alice".to_string()) })
            .await;
        assert!(matches!(first, StepResult::Success(_)));

        // Same step id, different input: the stored record does not match, so
        // the closure runs again. First success wins in the store, so the
        // record keeps the original output; the caller still gets the fresh one.
        let calls = AtomicUsize::new(0);
        let second: StepResult<String> = executor
            .execute("greet", &"bob", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("hi bob".to_string())
            })
            .await;
        match second {
            StepResult::Success(v) => assert_eq!(v, "hi bob"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fatal_errors_classify_as_fatal_failure() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let executor = StepExecutor::new(store, "run-1");

        let result: StepResult<i32> = executor
            .execute("transcribe", &"input", || async {
                Err(PipelineError::MissingConfiguration(
                    "TRANSCRIPTION_API_KEY".to_string(),
                ))
            })
            .await;

        assert!(matches!(result, StepResult::FatalFailure(_)));
    }

    #[tokio::test]
    async fn recorded_failure_re_executes_and_then_replays() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let executor = StepExecutor::new(store, "run-1");
        let calls = AtomicUsize::new(0);

        let first: StepResult<i32> = executor
            .execute("flaky", &1, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::service("stt", "HTTP 500"))
            })
            .await;
        assert!(matches!(first, StepResult::RecoverableFailure(_)));

        let second: StepResult<i32> = executor
            .execute("flaky", &1, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;
        assert!(matches!(second, StepResult::Success(7)));

        // Third invocation replays the success.
        let third: StepResult<i32> = executor
            .execute("flaky", &1, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;
        assert!(matches!(third, StepResult::Success(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
