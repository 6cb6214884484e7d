// Video-intelligence pipeline - the flagship checkpointed workflow
use super::{analysis, decisions, moments, timestamped_transcript, title, vocabulary};
use crate::adapters::content_index::{ContentIndex, VideoIndexDocument};
use crate::adapters::diarization::{poll_diarization, DiarizationResult, Diarizer, PollSchedule};
use crate::adapters::generation::StructuredGenerator;
use crate::adapters::notify::{Notification, Notifier};
use crate::adapters::storage::ObjectStorage;
use crate::adapters::thumbnail::ThumbnailGenerator;
use crate::adapters::transcription::{Transcriber, TranscriptionHints, TranscriptionResult};
use crate::error::PipelineError;
use crate::handoff::FailureHandoff;
use crate::pipeline::decisions::ExtractedDecision;
use crate::pipeline::moments::DetectedMoment;
use crate::pipeline::vocabulary::VocabularyTerm;
use crate::store::{PipelineStatus, VideoStore};
use crate::workflow::{RunOutcome, StepExecutor, WorkflowRuntime};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const WORKFLOW_KIND: &str = "video-intelligence";

/// Typed trigger payload. Re-invocation with the same video id is safe: the
/// run id derives from it and completed steps replay from their checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPipelineInput {
    pub video_id: String,
    pub video_url: String,
    #[serde(default)]
    pub video_title: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub skip_diarization: bool,
    #[serde(default)]
    pub participant_names: Vec<String>,
}

/// Typed result. Recoverable failures land here as `success: false`; only
/// fatal configuration errors propagate as `Err` past the pipeline boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPipelineOutput {
    pub video_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// All collaborators are injected so tests can substitute fakes. Optional
/// adapters model deployments without that capability; the pipeline decides
/// per stage whether absence is fatal or just skips the stage.
pub struct VideoPipeline {
    pub runtime: Arc<WorkflowRuntime>,
    pub store: Arc<dyn VideoStore>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub diarizer: Option<Arc<dyn Diarizer>>,
    pub generator: Option<Arc<dyn StructuredGenerator>>,
    pub storage: Option<Arc<dyn ObjectStorage>>,
    pub thumbnailer: Option<Arc<dyn ThumbnailGenerator>>,
    pub content_index: Option<Arc<dyn ContentIndex>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub diarization_polling: PollSchedule,
}

impl VideoPipeline {
    pub fn run_id_for(video_id: &str) -> String {
        format!("{}::{}", WORKFLOW_KIND, video_id)
    }

    /// Run one invocation to a terminal result.
    ///
    /// Never raises for recoverable failures: the failure handoff persists
    /// `failed` and the caller receives a structured output. Fatal
    /// configuration errors propagate after the handoff runs, so the host
    /// records a hard failure distinct from a handled one.
    pub async fn run(
        &self,
        input: VideoPipelineInput,
    ) -> Result<VideoPipelineOutput, PipelineError> {
        let run_id = Self::run_id_for(&input.video_id);

        let executor = match self
            .runtime
            .begin(&run_id, WORKFLOW_KIND)
            .await
            .map_err(PipelineError::Database)?
        {
            Some(executor) => executor,
            None => {
                return Ok(VideoPipelineOutput {
                    video_id: input.video_id,
                    success: false,
                    error: Some("run already in progress".to_string()),
                })
            }
        };

        let handoff = FailureHandoff::new(self.store.clone(), self.notifier.clone());

        match self.execute_stages(&executor, &input).await {
            Ok(()) => {
                self.runtime
                    .finish(&run_id, RunOutcome::Completed)
                    .await
                    .map_err(PipelineError::Database)?;
                Ok(VideoPipelineOutput {
                    video_id: input.video_id,
                    success: true,
                    error: None,
                })
            }
            Err(e) if e.is_fatal() => {
                handoff.handle(&input.video_id, &e).await;
                if let Err(finish_err) = self.runtime.finish(&run_id, RunOutcome::Failed).await {
                    warn!("⚠️ Failed to record run outcome: {}", finish_err);
                }
                Err(e)
            }
            Err(e) => {
                handoff.handle(&input.video_id, &e).await;
                if let Err(finish_err) = self.runtime.finish(&run_id, RunOutcome::Failed).await {
                    warn!("⚠️ Failed to record run outcome: {}", finish_err);
                }
                Ok(VideoPipelineOutput {
                    video_id: input.video_id,
                    success: false,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    async fn execute_stages(
        &self,
        executor: &StepExecutor,
        input: &VideoPipelineInput,
    ) -> Result<(), PipelineError> {
        let run_id = executor.run_id().to_string();
        let video_id = input.video_id.clone();
        info!("🎬 Video-intelligence run starting: {}", run_id);

        // 1. Status: transcribing.
        executor
            .execute("set_status_transcribing", &video_id, || async {
                self.store
                    .set_status(&video_id, PipelineStatus::Transcribing)
                    .await
            })
            .await
            .required("set_status_transcribing")?;

        // 2. Organization vocabulary, best-effort.
        let vocabulary_terms: Vec<VocabularyTerm> = executor
            .execute("fetch_vocabulary", &input.organization_id, || async {
                match &input.organization_id {
                    Some(org_id) => self.store.vocabulary_terms(org_id).await,
                    None => Ok(Vec::new()),
                }
            })
            .await
            .optional("fetch_vocabulary", Vec::new())?;

        // 3. Transcribe. A missing transcription adapter is fatal: there is
        // no meaningful fallback for the pipeline's core input.
        let hints = TranscriptionHints {
            vocabulary_terms: vocabulary_terms
                .iter()
                .map(|t| t.canonical_term.clone())
                .collect(),
            participant_names: input.participant_names.clone(),
        };
        let transcription: TranscriptionResult = executor
            .execute("transcribe", &(&input.video_url, &hints), || async {
                let transcriber = self.transcriber.as_ref().ok_or_else(|| {
                    PipelineError::MissingConfiguration("transcription adapter".to_string())
                })?;
                transcriber.transcribe(&input.video_url, &hints).await
            })
            .await
            .required("transcribe")?;

        info!(
            "📝 Transcribed video {}: {} chars, {} segments, {:.0}s",
            video_id,
            transcription.text.len(),
            transcription.segments.len(),
            transcription.duration_seconds
        );

        // 4. Vocabulary corrections on the full text and every segment.
        let transcription: TranscriptionResult = executor
            .execute(
                "apply_vocabulary",
                &(&transcription.text, &vocabulary_terms),
                || async {
                    Ok(vocabulary::correct_transcription(
                        &transcription,
                        &vocabulary_terms,
                    ))
                },
            )
            .await
            .required("apply_vocabulary")?;

        // 5. Persist transcript + duration.
        executor
            .execute("persist_transcript", &video_id, || async {
                self.store.save_transcript(&video_id, &transcription).await
            })
            .await
            .required("persist_transcript")?;

        // 6. Title: keep a human title, generate a replacement for
        // auto-generated ones. Generation failure keeps the original.
        let supplied_title = input.video_title.clone().unwrap_or_default();
        let final_title: String = executor
            .execute("ensure_title", &supplied_title, || async {
                let final_title = if title::title_needs_generation(&supplied_title) {
                    match self.generator.as_deref() {
                        Some(generator) => {
                            match title::generate_title(generator, &transcription.text).await {
                                Ok(generated) => {
                                    info!("🏷️ Generated title: {}", generated);
                                    generated
                                }
                                Err(e) => {
                                    warn!("⚠️ Title generation failed, keeping original: {}", e);
                                    supplied_title.clone()
                                }
                            }
                        }
                        None => supplied_title.clone(),
                    }
                } else {
                    supplied_title.clone()
                };
                if !final_title.is_empty() {
                    self.store.update_title(&video_id, &final_title).await?;
                }
                Ok(final_title)
            })
            .await
            .optional("ensure_title", supplied_title.clone())?;

        // 7. Thumbnail, best-effort. Skipped entirely when the generator or
        // storage is not configured.
        let _thumbnail_key: Option<String> = match (&self.thumbnailer, &self.storage) {
            (Some(thumbnailer), Some(storage)) => executor
                .execute("thumbnail", &input.video_url, || async {
                    let bytes = thumbnailer.generate(&input.video_url).await?;
                    let key = format!("thumbnails/{}.jpg", video_id);
                    storage.put(&key, bytes, "image/jpeg").await?;
                    self.store.set_thumbnail_key(&video_id, &key).await?;
                    Ok(Some(key))
                })
                .await
                .optional("thumbnail", None)?,
            _ => {
                info!("🖼️ Thumbnail stage skipped (adapter or storage not configured)");
                None
            }
        };

        // 8. Optional diarization.
        if !input.skip_diarization {
            if let Some(diarizer) = &self.diarizer {
                executor
                    .execute("set_status_diarizing", &video_id, || async {
                        self.store
                            .set_status(&video_id, PipelineStatus::Diarizing)
                            .await
                    })
                    .await
                    .required("set_status_diarizing")?;

                // Submission is its own checkpoint: the external job is a paid
                // side effect, and a restart mid-poll must resume against the
                // recorded job id instead of submitting a second one.
                let job_id: Option<String> = executor
                    .execute("diarization_submit", &input.video_url, || async {
                        diarizer.submit(&input.video_url).await.map(Some)
                    })
                    .await
                    .optional("diarization_submit", None)?;

                // Any diarization error means "unavailable", never a failed run.
                let diarization: Option<DiarizationResult> = match job_id {
                    Some(job_id) => {
                        info!("🗣️ Diarization job submitted: {}", job_id);
                        executor
                            .execute("diarize", &job_id, || async {
                                poll_diarization(
                                    diarizer.as_ref(),
                                    &self.runtime,
                                    &run_id,
                                    &job_id,
                                    self.diarization_polling,
                                )
                                .await
                                .map(Some)
                            })
                            .await
                            .optional("diarize", None)?
                    }
                    None => None,
                };

                match diarization {
                    Some(result) => {
                        executor
                            .execute("persist_diarization", &video_id, || async {
                                self.store.save_diarization(&video_id, &result).await
                            })
                            .await
                            .optional("persist_diarization", ())?;
                        info!(
                            "🗣️ Diarization persisted: {} speakers, {} segments",
                            result.speakers.len(),
                            result.segments.len()
                        );
                    }
                    None => info!("🗣️ Diarization unavailable, continuing without speakers"),
                }
            }
        }

        // 9. Status: analyzing.
        executor
            .execute("set_status_analyzing", &video_id, || async {
                self.store
                    .set_status(&video_id, PipelineStatus::Analyzing)
                    .await
            })
            .await
            .required("set_status_analyzing")?;

        // 10. AI analysis. A missing generation adapter is fatal here.
        let prompt_transcript = timestamped_transcript(&transcription);
        let analysis_result: analysis::AnalysisResult = executor
            .execute("analyze", &transcription.text, || async {
                let generator = self.generator.as_deref().ok_or_else(|| {
                    PipelineError::MissingConfiguration("generation adapter".to_string())
                })?;
                analysis::run_analysis(generator, &prompt_transcript).await
            })
            .await
            .required("analyze")?;

        // 11. Persist analysis; chapters are fully replaced.
        executor
            .execute("persist_analysis", &video_id, || async {
                self.store.save_analysis(&video_id, &analysis_result).await
            })
            .await
            .required("persist_analysis")?;

        // 12. Key moments, independently extracted and degraded on failure.
        // The persist only runs when extraction produced a fresh set, so a
        // failed extraction never wipes previously stored moments.
        let detected: Option<Vec<DetectedMoment>> = executor
            .execute("detect_moments", &transcription.text, || async {
                let generator = self.generator.as_deref().ok_or_else(|| {
                    PipelineError::MissingConfiguration("generation adapter".to_string())
                })?;
                moments::detect_moments(generator, &prompt_transcript)
                    .await
                    .map(Some)
            })
            .await
            .optional("detect_moments", None)?;
        if let Some(detected) = detected {
            executor
                .execute("persist_moments", &video_id, || async {
                    self.store.replace_moments(&video_id, &detected).await
                })
                .await
                .optional("persist_moments", ())?;
        }

        // 13. Decisions accumulate; only those above the persistence
        // threshold are written.
        let extracted: Option<Vec<ExtractedDecision>> = executor
            .execute("extract_decisions", &transcription.text, || async {
                let generator = self.generator.as_deref().ok_or_else(|| {
                    PipelineError::MissingConfiguration("generation adapter".to_string())
                })?;
                decisions::extract_decisions(generator, &prompt_transcript)
                    .await
                    .map(|extraction| Some(extraction.persistable))
            })
            .await
            .optional("extract_decisions", None)?;
        if let Some(extracted) = extracted {
            if !extracted.is_empty() {
                executor
                    .execute("persist_decisions", &video_id, || async {
                        self.store.insert_decisions(&video_id, &extracted).await
                    })
                    .await
                    .optional("persist_decisions", ())?;
            }
        }

        // 14. Unified content index sync, best-effort.
        if let Some(index) = &self.content_index {
            let document = VideoIndexDocument {
                id: format!("video::{}", video_id),
                video_id: video_id.clone(),
                title: final_title.clone(),
                transcript: transcription.text.clone(),
                summary: Some(analysis_result.summary.clone()),
                tags: analysis_result.tags.clone(),
                updated_at: Utc::now(),
            };
            executor
                .execute("sync_content_index", &video_id, || async {
                    index.sync_video(&document).await
                })
                .await
                .optional("sync_content_index", ())?;
        }

        // 15. Completed + notification.
        executor
            .execute("set_status_completed", &video_id, || async {
                self.store
                    .set_status(&video_id, PipelineStatus::Completed)
                    .await
            })
            .await
            .required("set_status_completed")?;

        if let Some(notifier) = &self.notifier {
            let notification = Notification::VideoProcessed {
                video_id: video_id.clone(),
                title: final_title,
                duration_seconds: transcription.duration_seconds,
            };
            if let Err(e) = notifier.notify(&notification).await {
                warn!("⚠️ Completion notification failed: {}", e);
            }
        }

        info!("✅ Video-intelligence run completed: {}", run_id);
        Ok(())
    }
}
