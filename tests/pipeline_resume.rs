// End-to-end pipeline tests over in-memory fakes: success, replay after
// re-invocation, resume after a failed stage, fatal misconfiguration, and
// duplicate-run refusal.
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use video_intel::adapters::diarization::{
    DiarizationJobStatus, DiarizationResult, Diarizer, PollSchedule, Utterance,
};
use video_intel::adapters::generation::StructuredGenerator;
use video_intel::adapters::transcription::{
    TranscriptSegment, Transcriber, TranscriptionHints, TranscriptionResult,
};
use video_intel::error::PipelineError;
use video_intel::health::HealthCheckResult;
use video_intel::pipeline::analysis::AnalysisResult;
use video_intel::pipeline::decisions::ExtractedDecision;
use video_intel::pipeline::moments::DetectedMoment;
use video_intel::pipeline::vocabulary::VocabularyTerm;
use video_intel::pipeline::{VideoPipeline, VideoPipelineInput};
use video_intel::store::{PipelineStatus, VideoStore};
use video_intel::workflow::{CheckpointStore, MemoryCheckpointStore, WorkflowRuntime};

struct FakeTranscriber {
    calls: AtomicUsize,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        _audio_url: &str,
        _hints: &TranscriptionHints,
    ) -> Result<TranscriptionResult, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TranscriptionResult {
            text: "We decided to ship the launch next Friday.".to_string(),
            segments: vec![
                TranscriptSegment {
                    start_time: 0.0,
                    end_time: 4.0,
                    text: "We decided to ship".to_string(),
                },
                TranscriptSegment {
                    start_time: 4.0,
                    end_time: 8.0,
                    text: "the launch next Friday.".to_string(),
                },
            ],
            duration_seconds: 120.0,
            language: Some("en".to_string()),
        })
    }
}

/// Fake provider whose jobs complete on the first poll. Counts submissions so
/// resume tests can assert the paid submit call never repeats.
struct FakeDiarizer {
    submits: AtomicUsize,
}

#[async_trait]
impl Diarizer for FakeDiarizer {
    async fn submit(&self, _audio_url: &str) -> Result<String, PipelineError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst);
        Ok(format!("job-{}", n + 1))
    }

    async fn poll(&self, _job_id: &str) -> Result<DiarizationJobStatus, PipelineError> {
        Ok(DiarizationJobStatus {
            status: "completed".to_string(),
            utterances: Some(vec![Utterance {
                speaker: "A".to_string(),
                start: 0,
                end: 8_000,
                text: "We decided to ship the launch next Friday.".to_string(),
                confidence: 0.95,
            }]),
            audio_duration: Some(120.0),
            language_code: Some("en".to_string()),
            error: None,
        })
    }
}

/// Keyword-dispatched fake model. `fail_summary` makes only the summary call
/// fail, which fails the required analysis stage while everything before it
/// checkpoints normally.
struct FakeGenerator {
    calls: AtomicUsize,
    fail_summary: AtomicBool,
}

impl FakeGenerator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_summary: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StructuredGenerator for FakeGenerator {
    async fn generate_json(&self, _system: &str, prompt: &str) -> Result<Value, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("Summarize this transcript") {
            if self.fail_summary.load(Ordering::SeqCst) {
                return Err(PipelineError::service("generation", "HTTP 503"));
            }
            return Ok(json!({"summary": "Weekly planning sync covering the launch."}));
        }
        if prompt.contains("topical tags") {
            return Ok(json!({"tags": ["planning", "launch"]}));
        }
        if prompt.contains("List the action items") {
            return Ok(json!([]));
        }
        if prompt.contains("into chapters") {
            return Ok(json!([]));
        }
        if prompt.contains("key moments") {
            return Ok(json!([{
                "title": "Launch date decided",
                "description": "The team commits to next Friday.",
                "start_time": 0.0,
                "end_time": 8.0,
                "category": "decision",
                "confidence": 150.0,
                "excerpt": "ship the launch next Friday"
            }]));
        }
        if prompt.contains("Extract every decision") {
            return Ok(json!([
                {
                    "summary": "Maybe revisit the color scheme",
                    "context": null,
                    "reasoning": null,
                    "start_time": 2.0,
                    "end_time": 3.0,
                    "category": "product",
                    "status": "proposed",
                    "confidence": 20.0
                },
                {
                    "summary": "Ship the launch next Friday",
                    "context": "End of planning discussion",
                    "reasoning": "All blockers resolved",
                    "start_time": 0.0,
                    "end_time": 8.0,
                    "category": "process",
                    "status": "decided",
                    "confidence": 80.0,
                    "tags": ["launch"],
                    "participants": [{"name": "Sam", "role": "decider"}]
                }
            ]));
        }
        if prompt.contains("title") {
            return Ok(json!({"title": "Launch Planning Sync"}));
        }
        Err(PipelineError::service("generation", "unexpected prompt"))
    }
}

#[derive(Default)]
struct MemoryVideoStore {
    statuses: Mutex<Vec<String>>,
    failed_error: Mutex<Option<String>>,
    transcript_saves: AtomicUsize,
    title: Mutex<Option<String>>,
    thumbnail_key: Mutex<Option<String>>,
    diarizations: AtomicUsize,
    analyses: AtomicUsize,
    moments: Mutex<Vec<DetectedMoment>>,
    decisions: Mutex<Vec<ExtractedDecision>>,
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn set_status(
        &self,
        _video_id: &str,
        status: PipelineStatus,
    ) -> Result<(), PipelineError> {
        self.statuses.lock().unwrap().push(status.as_str().to_string());
        Ok(())
    }

    async fn set_failed(&self, _video_id: &str, error: &str) -> Result<(), PipelineError> {
        self.statuses.lock().unwrap().push("failed".to_string());
        *self.failed_error.lock().unwrap() = Some(error.to_string());
        Ok(())
    }

    async fn save_transcript(
        &self,
        _video_id: &str,
        _transcription: &TranscriptionResult,
    ) -> Result<(), PipelineError> {
        self.transcript_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_title(&self, _video_id: &str, title: &str) -> Result<(), PipelineError> {
        *self.title.lock().unwrap() = Some(title.to_string());
        Ok(())
    }

    async fn set_thumbnail_key(&self, _video_id: &str, key: &str) -> Result<(), PipelineError> {
        *self.thumbnail_key.lock().unwrap() = Some(key.to_string());
        Ok(())
    }

    async fn save_diarization(
        &self,
        _video_id: &str,
        _result: &DiarizationResult,
    ) -> Result<(), PipelineError> {
        self.diarizations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_analysis(
        &self,
        _video_id: &str,
        _analysis: &AnalysisResult,
    ) -> Result<(), PipelineError> {
        self.analyses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn replace_moments(
        &self,
        _video_id: &str,
        moments: &[DetectedMoment],
    ) -> Result<(), PipelineError> {
        *self.moments.lock().unwrap() = moments.to_vec();
        Ok(())
    }

    async fn insert_decisions(
        &self,
        _video_id: &str,
        decisions: &[ExtractedDecision],
    ) -> Result<(), PipelineError> {
        self.decisions.lock().unwrap().extend_from_slice(decisions);
        Ok(())
    }

    async fn vocabulary_terms(
        &self,
        _organization_id: &str,
    ) -> Result<Vec<VocabularyTerm>, PipelineError> {
        Ok(Vec::new())
    }

    async fn save_health_results(
        &self,
        _results: &[HealthCheckResult],
    ) -> Result<(), PipelineError> {
        Ok(())
    }
}

struct Harness {
    checkpoints: Arc<MemoryCheckpointStore>,
    store: Arc<MemoryVideoStore>,
    transcriber: Arc<FakeTranscriber>,
    diarizer: Arc<FakeDiarizer>,
    generator: Arc<FakeGenerator>,
}

impl Harness {
    fn new() -> Self {
        Self {
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            store: Arc::new(MemoryVideoStore::default()),
            transcriber: Arc::new(FakeTranscriber {
                calls: AtomicUsize::new(0),
            }),
            diarizer: Arc::new(FakeDiarizer {
                submits: AtomicUsize::new(0),
            }),
            generator: Arc::new(FakeGenerator::new()),
        }
    }

    fn pipeline(&self) -> VideoPipeline {
        VideoPipeline {
            runtime: Arc::new(WorkflowRuntime::new(self.checkpoints.clone())),
            store: self.store.clone(),
            transcriber: Some(self.transcriber.clone()),
            diarizer: None,
            generator: Some(self.generator.clone()),
            storage: None,
            thumbnailer: None,
            content_index: None,
            notifier: None,
            diarization_polling: PollSchedule {
                interval: std::time::Duration::from_millis(1),
                max_attempts: 5,
            },
        }
    }

    fn input(&self, video_id: &str) -> VideoPipelineInput {
        VideoPipelineInput {
            video_id: video_id.to_string(),
            video_url: "https://media.example.com/raw/a.mp4".to_string(),
            video_title: Some("IMG_1234.MOV".to_string()),
            organization_id: None,
            skip_diarization: true,
            participant_names: Vec::new(),
        }
    }
}

#[tokio::test]
async fn pipeline_completes_and_persists_artifacts() {
    let harness = Harness::new();
    let output = harness.pipeline().run(harness.input("vid-1")).await.unwrap();

    assert!(output.success);
    assert_eq!(output.video_id, "vid-1");

    let statuses = harness.store.statuses.lock().unwrap().clone();
    assert_eq!(statuses, vec!["transcribing", "analyzing", "completed"]);

    // Auto-generated filename was replaced with a model title.
    assert_eq!(
        harness.store.title.lock().unwrap().as_deref(),
        Some("Launch Planning Sync")
    );
    assert_eq!(harness.store.transcript_saves.load(Ordering::SeqCst), 1);
    assert_eq!(harness.store.analyses.load(Ordering::SeqCst), 1);

    // Moment confidence was clamped into [0, 100].
    let moments = harness.store.moments.lock().unwrap().clone();
    assert_eq!(moments.len(), 1);
    assert_eq!(moments[0].confidence, 100.0);

    // Only the decision at or above the persistence threshold survives.
    let decisions = harness.store.decisions.lock().unwrap().clone();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].summary, "Ship the launch next Friday");
}

#[tokio::test]
async fn rerun_replays_checkpoints_without_reinvoking_adapters() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();

    let first = pipeline.run(harness.input("vid-2")).await.unwrap();
    assert!(first.success);
    let calls_after_first = harness.generator.calls.load(Ordering::SeqCst);

    let second = pipeline.run(harness.input("vid-2")).await.unwrap();
    assert!(second.success);

    // Every step replays from its checkpoint: no paid calls repeat.
    assert_eq!(harness.transcriber.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.generator.calls.load(Ordering::SeqCst), calls_after_first);
    assert_eq!(harness.store.transcript_saves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_analysis_resumes_without_retranscribing() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    harness.generator.fail_summary.store(true, Ordering::SeqCst);

    // The summary failure fails the required analysis stage; the run lands in
    // `failed` but does not raise.
    let first = pipeline.run(harness.input("vid-3")).await.unwrap();
    assert!(!first.success);
    assert!(first.error.unwrap().contains("analyze"));
    assert!(harness.store.failed_error.lock().unwrap().is_some());
    assert_eq!(harness.transcriber.calls.load(Ordering::SeqCst), 1);

    // Service recovers; the rerun replays everything up to the failed step.
    harness.generator.fail_summary.store(false, Ordering::SeqCst);
    let second = pipeline.run(harness.input("vid-3")).await.unwrap();
    assert!(second.success);
    assert_eq!(harness.transcriber.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.store.analyses.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resume_does_not_resubmit_diarization() {
    let harness = Harness::new();
    let mut pipeline = harness.pipeline();
    pipeline.diarizer = Some(harness.diarizer.clone());
    harness.generator.fail_summary.store(true, Ordering::SeqCst);

    let mut input = harness.input("vid-6");
    input.skip_diarization = false;

    // Diarization completes, then the required analysis stage fails the run.
    let first = pipeline.run(input.clone()).await.unwrap();
    assert!(!first.success);
    assert_eq!(harness.diarizer.submits.load(Ordering::SeqCst), 1);
    assert_eq!(harness.store.diarizations.load(Ordering::SeqCst), 1);

    // The rerun replays the submit checkpoint: the external job is paid for
    // exactly once no matter how many times the run resumes.
    harness.generator.fail_summary.store(false, Ordering::SeqCst);
    let second = pipeline.run(input).await.unwrap();
    assert!(second.success);
    assert_eq!(harness.diarizer.submits.load(Ordering::SeqCst), 1);
    assert_eq!(harness.store.diarizations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_transcriber_is_fatal() {
    let harness = Harness::new();
    let mut pipeline = harness.pipeline();
    pipeline.transcriber = None;

    let err = pipeline.run(harness.input("vid-4")).await.unwrap_err();
    assert!(err.is_fatal());

    // The failure handoff still persisted the terminal status.
    let statuses = harness.store.statuses.lock().unwrap().clone();
    assert_eq!(statuses.last().map(String::as_str), Some("failed"));
}

#[tokio::test]
async fn in_flight_run_refuses_duplicate_trigger() {
    let harness = Harness::new();

    // Simulate a concurrent executor holding the claim.
    harness
        .checkpoints
        .try_claim_run(&VideoPipeline::run_id_for("vid-5"), "video-intelligence")
        .await
        .unwrap();

    let output = harness.pipeline().run(harness.input("vid-5")).await.unwrap();
    assert!(!output.success);
    assert_eq!(output.error.as_deref(), Some("run already in progress"));
    assert_eq!(harness.transcriber.calls.load(Ordering::SeqCst), 0);
}
