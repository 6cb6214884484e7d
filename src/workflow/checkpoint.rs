// Checkpointing - durable step records, suspensions, and run claims
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// How long a run claim stays valid without finishing. A crashed process
/// never releases its claim, so the claim is a lease: once it expires, a
/// re-invocation may take the run over and replay through the checkpoints.
/// Must comfortably exceed the longest legitimate run (the diarization poll
/// loop alone can hold a run for ~10 minutes).
const DEFAULT_CLAIM_TTL_MINUTES: i64 = 60;

/// StepRecord - the durable record of one completed step attempt.
///
/// Immutable once written with an output. A record carrying an error marks
/// the attempt for diagnostics but does not count as completed: a resumed
/// run re-executes that step, and its eventual success replaces the error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub run_id: String,
    pub step_id: String,
    pub input_hash: String,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Durable storage for step checkpoints, suspension deadlines, and run claims.
///
/// Injected into the executor and runtime so tests can substitute the
/// in-memory implementation.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the record for (run_id, step_id), if any.
    async fn load(&self, run_id: &str, step_id: &str) -> Result<Option<StepRecord>, String>;

    /// Record a successful step. First success wins: an already-recorded
    /// output is never overwritten, only an error row is replaced.
    async fn save_success(
        &self,
        run_id: &str,
        step_id: &str,
        input_hash: &str,
        output: &serde_json::Value,
    ) -> Result<(), String>;

    /// Record a failed attempt so a resumed run cannot silently skip the stage.
    async fn save_failure(
        &self,
        run_id: &str,
        step_id: &str,
        input_hash: &str,
        error: &str,
    ) -> Result<(), String>;

    /// Load a persisted wake deadline for a durable sleep, if one exists.
    async fn load_suspension(
        &self,
        run_id: &str,
        step_id: &str,
    ) -> Result<Option<DateTime<Utc>>, String>;

    /// Persist a wake deadline before suspending. Keeps the first deadline on
    /// conflict so a resumed process honors the original schedule.
    async fn save_suspension(
        &self,
        run_id: &str,
        step_id: &str,
        wake_at: DateTime<Utc>,
    ) -> Result<(), String>;

    /// Claim a run id for execution. Returns false when another executor
    /// currently holds a live (unexpired) claim on the run. An expired claim
    /// belongs to a crashed process and is re-taken.
    async fn try_claim_run(&self, run_id: &str, workflow_kind: &str) -> Result<bool, String>;

    /// Release a claimed run with its terminal status ("completed"/"failed").
    async fn finish_run(&self, run_id: &str, status: &str) -> Result<(), String>;
}

/// Postgres-backed checkpoint store.
pub struct PgCheckpointStore {
    pool: PgPool,
    claim_ttl: ChronoDuration,
}

impl PgCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            claim_ttl: ChronoDuration::minutes(DEFAULT_CLAIM_TTL_MINUTES),
        }
    }

    pub fn with_claim_ttl(mut self, claim_ttl: ChronoDuration) -> Self {
        self.claim_ttl = claim_ttl;
        self
    }

    /// Setup checkpoint tables
    pub async fn setup(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_step_checkpoints (
                run_id VARCHAR(255) NOT NULL,
                step_id VARCHAR(255) NOT NULL,
                input_hash VARCHAR(64) NOT NULL,
                output JSONB,
                error TEXT,
                completed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (run_id, step_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_suspensions (
                run_id VARCHAR(255) NOT NULL,
                step_id VARCHAR(255) NOT NULL,
                wake_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (run_id, step_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_runs (
                run_id VARCHAR(255) PRIMARY KEY,
                workflow_kind VARCHAR(100) NOT NULL,
                status VARCHAR(32) NOT NULL,
                started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                finished_at TIMESTAMPTZ,
                claim_expires_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_workflow_step_checkpoints_run_id
            ON workflow_step_checkpoints(run_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("✅ Workflow checkpoint tables setup complete");
        Ok(())
    }

    /// Delete workflow state older than the cutoff: step checkpoints, spent
    /// wake deadlines, and finished run rows. Live (running) runs are kept.
    pub async fn cleanup_old_checkpoints(&self, older_than_days: i64) -> Result<u64, String> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days);

        let checkpoints =
            sqlx::query("DELETE FROM workflow_step_checkpoints WHERE completed_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| format!("Failed to cleanup checkpoints: {}", e))?
                .rows_affected();

        let suspensions = sqlx::query("DELETE FROM workflow_suspensions WHERE wake_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to cleanup suspensions: {}", e))?
            .rows_affected();

        let runs = sqlx::query(
            "DELETE FROM workflow_runs WHERE status <> 'running' AND finished_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to cleanup finished runs: {}", e))?
        .rows_affected();

        let total = checkpoints + suspensions + runs;
        info!(
            "🧹 Cleaned up {} old workflow rows ({} checkpoints, {} suspensions, {} runs)",
            total, checkpoints, suspensions, runs
        );
        Ok(total)
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn load(&self, run_id: &str, step_id: &str) -> Result<Option<StepRecord>, String> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            r#"
            SELECT run_id, step_id, input_hash, output, error, completed_at
            FROM workflow_step_checkpoints
            WHERE run_id = $1 AND step_id = $2
            "#,
        )
        .bind(run_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| format!("Failed to load checkpoint: {}", e))?;

        Ok(row.map(|r| StepRecord {
            run_id: r.run_id,
            step_id: r.step_id,
            input_hash: r.input_hash,
            output: r.output,
            error: r.error,
            completed_at: r.completed_at,
        }))
    }

    async fn save_success(
        &self,
        run_id: &str,
        step_id: &str,
        input_hash: &str,
        output: &serde_json::Value,
    ) -> Result<(), String> {
        // First success wins; only an error row may be replaced. Two racing
        // executors can therefore never record two different outputs.
        sqlx::query(
            r#"
            INSERT INTO workflow_step_checkpoints (run_id, step_id, input_hash, output, error, completed_at)
            VALUES ($1, $2, $3, $4, NULL, $5)
            ON CONFLICT (run_id, step_id) DO UPDATE
            SET input_hash = EXCLUDED.input_hash,
                output = EXCLUDED.output,
                error = NULL,
                completed_at = EXCLUDED.completed_at
            WHERE workflow_step_checkpoints.error IS NOT NULL
            "#,
        )
        .bind(run_id)
        .bind(step_id)
        .bind(input_hash)
        .bind(output)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save checkpoint: {}", e))?;

        Ok(())
    }

    async fn save_failure(
        &self,
        run_id: &str,
        step_id: &str,
        input_hash: &str,
        error: &str,
    ) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO workflow_step_checkpoints (run_id, step_id, input_hash, output, error, completed_at)
            VALUES ($1, $2, $3, NULL, $4, $5)
            ON CONFLICT (run_id, step_id) DO UPDATE
            SET error = EXCLUDED.error,
                completed_at = EXCLUDED.completed_at
            WHERE workflow_step_checkpoints.output IS NULL
            "#,
        )
        .bind(run_id)
        .bind(step_id)
        .bind(input_hash)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to record step failure: {}", e))?;

        Ok(())
    }

    async fn load_suspension(
        &self,
        run_id: &str,
        step_id: &str,
    ) -> Result<Option<DateTime<Utc>>, String> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT wake_at FROM workflow_suspensions WHERE run_id = $1 AND step_id = $2",
        )
        .bind(run_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| format!("Failed to load suspension: {}", e))
    }

    async fn save_suspension(
        &self,
        run_id: &str,
        step_id: &str,
        wake_at: DateTime<Utc>,
    ) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO workflow_suspensions (run_id, step_id, wake_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (run_id, step_id) DO NOTHING
            "#,
        )
        .bind(run_id)
        .bind(step_id)
        .bind(wake_at)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save suspension: {}", e))?;

        Ok(())
    }

    async fn try_claim_run(&self, run_id: &str, workflow_kind: &str) -> Result<bool, String> {
        let now = Utc::now();
        // A 'running' row only blocks while its lease is live. A NULL expiry
        // (row written before leases existed) counts as expired.
        let claimed = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO workflow_runs (run_id, workflow_kind, status, started_at, finished_at, claim_expires_at)
            VALUES ($1, $2, 'running', $3, NULL, $4)
            ON CONFLICT (run_id) DO UPDATE
            SET status = 'running', started_at = $3, finished_at = NULL, claim_expires_at = $4
            WHERE workflow_runs.status <> 'running'
               OR workflow_runs.claim_expires_at IS NULL
               OR workflow_runs.claim_expires_at <= $3
            RETURNING run_id
            "#,
        )
        .bind(run_id)
        .bind(workflow_kind)
        .bind(now)
        .bind(now + self.claim_ttl)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| format!("Failed to claim run: {}", e))?;

        Ok(claimed.is_some())
    }

    async fn finish_run(&self, run_id: &str, status: &str) -> Result<(), String> {
        sqlx::query("UPDATE workflow_runs SET status = $2, finished_at = $3 WHERE run_id = $1")
            .bind(run_id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to finish run: {}", e))?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct CheckpointRow {
    run_id: String,
    step_id: String,
    input_hash: String,
    output: Option<serde_json::Value>,
    error: Option<String>,
    completed_at: DateTime<Utc>,
}

struct RunClaim {
    status: String,
    claim_expires_at: DateTime<Utc>,
}

/// In-memory checkpoint store for tests and single-process dry runs.
pub struct MemoryCheckpointStore {
    steps: RwLock<HashMap<(String, String), StepRecord>>,
    suspensions: RwLock<HashMap<(String, String), DateTime<Utc>>>,
    runs: RwLock<HashMap<String, RunClaim>>,
    claim_ttl: ChronoDuration,
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            steps: RwLock::new(HashMap::new()),
            suspensions: RwLock::new(HashMap::new()),
            runs: RwLock::new(HashMap::new()),
            claim_ttl: ChronoDuration::minutes(DEFAULT_CLAIM_TTL_MINUTES),
        }
    }

    pub fn with_claim_ttl(mut self, claim_ttl: ChronoDuration) -> Self {
        self.claim_ttl = claim_ttl;
        self
    }

    /// Number of recorded step checkpoints (success or failure).
    pub async fn record_count(&self) -> usize {
        self.steps.read().await.len()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, run_id: &str, step_id: &str) -> Result<Option<StepRecord>, String> {
        let key = (run_id.to_string(), step_id.to_string());
        Ok(self.steps.read().await.get(&key).cloned())
    }

    async fn save_success(
        &self,
        run_id: &str,
        step_id: &str,
        input_hash: &str,
        output: &serde_json::Value,
    ) -> Result<(), String> {
        let key = (run_id.to_string(), step_id.to_string());
        let mut steps = self.steps.write().await;
        if let Some(existing) = steps.get(&key) {
            if existing.output.is_some() {
                return Ok(());
            }
        }
        steps.insert(
            key,
            StepRecord {
                run_id: run_id.to_string(),
                step_id: step_id.to_string(),
                input_hash: input_hash.to_string(),
                output: Some(output.clone()),
                error: None,
                completed_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn save_failure(
        &self,
        run_id: &str,
        step_id: &str,
        input_hash: &str,
        error: &str,
    ) -> Result<(), String> {
        let key = (run_id.to_string(), step_id.to_string());
        let mut steps = self.steps.write().await;
        if let Some(existing) = steps.get(&key) {
            if existing.output.is_some() {
                return Ok(());
            }
        }
        steps.insert(
            key,
            StepRecord {
                run_id: run_id.to_string(),
                step_id: step_id.to_string(),
                input_hash: input_hash.to_string(),
                output: None,
                error: Some(error.to_string()),
                completed_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn load_suspension(
        &self,
        run_id: &str,
        step_id: &str,
    ) -> Result<Option<DateTime<Utc>>, String> {
        let key = (run_id.to_string(), step_id.to_string());
        Ok(self.suspensions.read().await.get(&key).copied())
    }

    async fn save_suspension(
        &self,
        run_id: &str,
        step_id: &str,
        wake_at: DateTime<Utc>,
    ) -> Result<(), String> {
        let key = (run_id.to_string(), step_id.to_string());
        self.suspensions.write().await.entry(key).or_insert(wake_at);
        Ok(())
    }

    async fn try_claim_run(&self, run_id: &str, _workflow_kind: &str) -> Result<bool, String> {
        let now = Utc::now();
        let mut runs = self.runs.write().await;
        match runs.get(run_id) {
            Some(claim) if claim.status == "running" && claim.claim_expires_at > now => Ok(false),
            _ => {
                runs.insert(
                    run_id.to_string(),
                    RunClaim {
                        status: "running".to_string(),
                        claim_expires_at: now + self.claim_ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn finish_run(&self, run_id: &str, status: &str) -> Result<(), String> {
        self.runs.write().await.insert(
            run_id.to_string(),
            RunClaim {
                status: status.to_string(),
                claim_expires_at: Utc::now(),
            },
        );
        Ok(())
    }
}
