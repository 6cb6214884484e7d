// Host data store - pipeline status and knowledge artifacts
use crate::adapters::diarization::DiarizationResult;
use crate::adapters::transcription::TranscriptionResult;
use crate::error::PipelineError;
use crate::health::HealthCheckResult;
use crate::pipeline::analysis::AnalysisResult;
use crate::pipeline::decisions::ExtractedDecision;
use crate::pipeline::moments::DetectedMoment;
use crate::pipeline::vocabulary::VocabularyTerm;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Externally observable pipeline state, persisted outside the workflow so
/// observers can poll progress independently of the running process. The
/// string values are a wire contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Pending,
    Transcribing,
    Diarizing,
    Analyzing,
    Completed,
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Pending => "pending",
            PipelineStatus::Transcribing => "transcribing",
            PipelineStatus::Diarizing => "diarizing",
            PipelineStatus::Analyzing => "analyzing",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
        }
    }
}

/// Persistence surface the pipeline writes through. Injected so tests can
/// substitute an in-memory fake.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn set_status(&self, video_id: &str, status: PipelineStatus)
        -> Result<(), PipelineError>;

    /// Set `failed` plus the error message in one write.
    async fn set_failed(&self, video_id: &str, error: &str) -> Result<(), PipelineError>;

    async fn save_transcript(
        &self,
        video_id: &str,
        transcription: &TranscriptionResult,
    ) -> Result<(), PipelineError>;

    async fn update_title(&self, video_id: &str, title: &str) -> Result<(), PipelineError>;

    async fn set_thumbnail_key(&self, video_id: &str, key: &str) -> Result<(), PipelineError>;

    async fn save_diarization(
        &self,
        video_id: &str,
        result: &DiarizationResult,
    ) -> Result<(), PipelineError>;

    /// Persist summary/tags/action items and replace all prior chapters with
    /// the new set (full replace, not merge).
    async fn save_analysis(
        &self,
        video_id: &str,
        analysis: &AnalysisResult,
    ) -> Result<(), PipelineError>;

    /// Replace all prior moments for the video.
    async fn replace_moments(
        &self,
        video_id: &str,
        moments: &[DetectedMoment],
    ) -> Result<(), PipelineError>;

    /// Append decisions; prior decisions are never replaced.
    async fn insert_decisions(
        &self,
        video_id: &str,
        decisions: &[ExtractedDecision],
    ) -> Result<(), PipelineError>;

    async fn vocabulary_terms(
        &self,
        organization_id: &str,
    ) -> Result<Vec<VocabularyTerm>, PipelineError>;

    async fn save_health_results(
        &self,
        results: &[HealthCheckResult],
    ) -> Result<(), PipelineError>;
}

/// Postgres-backed store.
pub struct PgVideoStore {
    pool: PgPool,
}

impl PgVideoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Setup artifact tables
    pub async fn setup(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_pipeline_status (
                video_id VARCHAR(255) PRIMARY KEY,
                status VARCHAR(32) NOT NULL,
                error_message TEXT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_metadata (
                video_id VARCHAR(255) PRIMARY KEY,
                title TEXT,
                thumbnail_key TEXT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_transcripts (
                video_id VARCHAR(255) PRIMARY KEY,
                full_text TEXT NOT NULL,
                segments JSONB NOT NULL,
                duration_seconds DOUBLE PRECISION NOT NULL,
                language VARCHAR(16),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_analysis (
                video_id VARCHAR(255) PRIMARY KEY,
                summary TEXT NOT NULL,
                tags JSONB NOT NULL,
                action_items JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_chapters (
                id VARCHAR(64) PRIMARY KEY,
                video_id VARCHAR(255) NOT NULL,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                start_time DOUBLE PRECISION NOT NULL,
                end_time DOUBLE PRECISION NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_moments (
                id VARCHAR(64) PRIMARY KEY,
                video_id VARCHAR(255) NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                category VARCHAR(32) NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                start_time DOUBLE PRECISION NOT NULL,
                end_time DOUBLE PRECISION NOT NULL,
                excerpt TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_decisions (
                id VARCHAR(64) PRIMARY KEY,
                video_id VARCHAR(255) NOT NULL,
                summary TEXT NOT NULL,
                context TEXT,
                reasoning TEXT,
                category VARCHAR(32) NOT NULL,
                status VARCHAR(32) NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                start_time DOUBLE PRECISION NOT NULL,
                end_time DOUBLE PRECISION NOT NULL,
                tags JSONB NOT NULL,
                participants JSONB NOT NULL,
                refs JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_speaker_segments (
                id VARCHAR(64) PRIMARY KEY,
                video_id VARCHAR(255) NOT NULL,
                speaker_label VARCHAR(64) NOT NULL,
                start_ms BIGINT NOT NULL,
                end_ms BIGINT NOT NULL,
                text TEXT NOT NULL,
                confidence DOUBLE PRECISION NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_speakers (
                video_id VARCHAR(255) NOT NULL,
                speaker_label VARCHAR(64) NOT NULL,
                total_speaking_time_ms BIGINT NOT NULL,
                segment_count BIGINT NOT NULL,
                speaking_percentage BIGINT NOT NULL,
                PRIMARY KEY (video_id, speaker_label)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS organization_vocabulary (
                organization_id VARCHAR(255) NOT NULL,
                canonical_term TEXT NOT NULL,
                variations JSONB NOT NULL,
                PRIMARY KEY (organization_id, canonical_term)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS service_health_checks (
                id VARCHAR(64) PRIMARY KEY,
                service_name VARCHAR(64) NOT NULL,
                status VARCHAR(32) NOT NULL,
                latency_ms BIGINT,
                error TEXT,
                checked_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_video_decisions_video_id
            ON video_decisions(video_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("✅ Video artifact tables setup complete");
        Ok(())
    }
}

#[async_trait]
impl VideoStore for PgVideoStore {
    async fn set_status(
        &self,
        video_id: &str,
        status: PipelineStatus,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO video_pipeline_status (video_id, status, error_message, updated_at)
            VALUES ($1, $2, NULL, $3)
            ON CONFLICT (video_id) DO UPDATE
            SET status = EXCLUDED.status, error_message = NULL, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(video_id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_failed(&self, video_id: &str, error: &str) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO video_pipeline_status (video_id, status, error_message, updated_at)
            VALUES ($1, 'failed', $2, $3)
            ON CONFLICT (video_id) DO UPDATE
            SET status = 'failed', error_message = EXCLUDED.error_message, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(video_id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_transcript(
        &self,
        video_id: &str,
        transcription: &TranscriptionResult,
    ) -> Result<(), PipelineError> {
        let segments = serde_json::to_value(&transcription.segments)?;
        sqlx::query(
            r#"
            INSERT INTO video_transcripts (video_id, full_text, segments, duration_seconds, language, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (video_id) DO UPDATE
            SET full_text = EXCLUDED.full_text,
                segments = EXCLUDED.segments,
                duration_seconds = EXCLUDED.duration_seconds,
                language = EXCLUDED.language,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(video_id)
        .bind(&transcription.text)
        .bind(segments)
        .bind(transcription.duration_seconds)
        .bind(&transcription.language)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_title(&self, video_id: &str, title: &str) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO video_metadata (video_id, title, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (video_id) DO UPDATE
            SET title = EXCLUDED.title, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(video_id)
        .bind(title)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_thumbnail_key(&self, video_id: &str, key: &str) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO video_metadata (video_id, thumbnail_key, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (video_id) DO UPDATE
            SET thumbnail_key = EXCLUDED.thumbnail_key, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(video_id)
        .bind(key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_diarization(
        &self,
        video_id: &str,
        result: &DiarizationResult,
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM video_speaker_segments WHERE video_id = $1")
            .bind(video_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM video_speakers WHERE video_id = $1")
            .bind(video_id)
            .execute(&mut *tx)
            .await?;

        for segment in &result.segments {
            sqlx::query(
                r#"
                INSERT INTO video_speaker_segments (id, video_id, speaker_label, start_ms, end_ms, text, confidence)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(video_id)
            .bind(&segment.speaker_label)
            .bind(segment.start_ms)
            .bind(segment.end_ms)
            .bind(&segment.text)
            .bind(segment.confidence)
            .execute(&mut *tx)
            .await?;
        }

        for speaker in &result.speakers {
            sqlx::query(
                r#"
                INSERT INTO video_speakers (video_id, speaker_label, total_speaking_time_ms, segment_count, speaking_percentage)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(video_id)
            .bind(&speaker.speaker_label)
            .bind(speaker.total_speaking_time_ms)
            .bind(speaker.segment_count)
            .bind(speaker.speaking_percentage)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save_analysis(
        &self,
        video_id: &str,
        analysis: &AnalysisResult,
    ) -> Result<(), PipelineError> {
        let tags = serde_json::to_value(&analysis.tags)?;
        let action_items = serde_json::to_value(&analysis.action_items)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO video_analysis (video_id, summary, tags, action_items, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (video_id) DO UPDATE
            SET summary = EXCLUDED.summary,
                tags = EXCLUDED.tags,
                action_items = EXCLUDED.action_items,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(video_id)
        .bind(&analysis.summary)
        .bind(tags)
        .bind(action_items)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        // Full replace of chapters, never a merge.
        sqlx::query("DELETE FROM video_chapters WHERE video_id = $1")
            .bind(video_id)
            .execute(&mut *tx)
            .await?;
        for chapter in &analysis.chapters {
            sqlx::query(
                r#"
                INSERT INTO video_chapters (id, video_id, title, summary, start_time, end_time)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(video_id)
            .bind(&chapter.title)
            .bind(&chapter.summary)
            .bind(chapter.start_time)
            .bind(chapter.end_time)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn replace_moments(
        &self,
        video_id: &str,
        moments: &[DetectedMoment],
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM video_moments WHERE video_id = $1")
            .bind(video_id)
            .execute(&mut *tx)
            .await?;

        for moment in moments {
            let category = serde_json::to_value(moment.category)?;
            sqlx::query(
                r#"
                INSERT INTO video_moments (id, video_id, title, description, category, confidence, start_time, end_time, excerpt)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(video_id)
            .bind(&moment.title)
            .bind(&moment.description)
            .bind(category.as_str().unwrap_or("highlight"))
            .bind(moment.confidence)
            .bind(moment.start_time)
            .bind(moment.end_time)
            .bind(&moment.excerpt)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_decisions(
        &self,
        video_id: &str,
        decisions: &[ExtractedDecision],
    ) -> Result<(), PipelineError> {
        // All-or-nothing: a failure mid-batch must not leave a partial set of
        // decisions behind for the replayed step to duplicate.
        let mut tx = self.pool.begin().await?;

        for decision in decisions {
            let category = serde_json::to_value(decision.category)?;
            let status = serde_json::to_value(decision.status)?;
            let tags = serde_json::to_value(&decision.tags)?;
            let participants = serde_json::to_value(&decision.participants)?;
            let references = serde_json::to_value(&decision.references)?;

            sqlx::query(
                r#"
                INSERT INTO video_decisions
                (id, video_id, summary, context, reasoning, category, status, confidence,
                 start_time, end_time, tags, participants, refs, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(video_id)
            .bind(&decision.summary)
            .bind(&decision.context)
            .bind(&decision.reasoning)
            .bind(category.as_str().unwrap_or("other"))
            .bind(status.as_str().unwrap_or("proposed"))
            .bind(decision.confidence)
            .bind(decision.start_time)
            .bind(decision.end_time)
            .bind(tags)
            .bind(participants)
            .bind(references)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn vocabulary_terms(
        &self,
        organization_id: &str,
    ) -> Result<Vec<VocabularyTerm>, PipelineError> {
        let rows = sqlx::query_as::<_, VocabularyRow>(
            r#"
            SELECT canonical_term, variations
            FROM organization_vocabulary
            WHERE organization_id = $1
            ORDER BY canonical_term
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let variations: Vec<String> = serde_json::from_value(row.variations)?;
                Ok(VocabularyTerm {
                    canonical_term: row.canonical_term,
                    variations,
                })
            })
            .collect()
    }

    async fn save_health_results(
        &self,
        results: &[HealthCheckResult],
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;
        for result in results {
            sqlx::query(
                r#"
                INSERT INTO service_health_checks (id, service_name, status, latency_ms, error, checked_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&result.service_name)
            .bind(result.status.as_str())
            .bind(result.latency_ms)
            .bind(&result.error)
            .bind(result.checked_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct VocabularyRow {
    canonical_term: String,
    variations: serde_json::Value,
}
