// Speaker diarization adapter - submit-then-poll protocol
use crate::error::PipelineError;
use crate::workflow::WorkflowRuntime;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Poll interval for the external diarization job.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Attempt budget: 200 polls at 3s, roughly ten minutes.
pub const MAX_POLL_ATTEMPTS: u32 = 200;

/// Poll pacing for an external diarization job. Defaults match the provider's
/// guidance; tests shrink both to exercise the terminal states quickly.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_attempts: MAX_POLL_ATTEMPTS,
        }
    }
}

/// A transcript span attributed to one speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiarizedSegment {
    pub speaker_label: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
    pub confidence: f64,
}

/// Per-speaker aggregate derived from the segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerSummary {
    pub speaker_label: String,
    pub total_speaking_time_ms: i64,
    pub segment_count: i64,
    /// Rounded share of total speaking time; shares sum to 100.
    pub speaking_percentage: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiarizationResult {
    pub segments: Vec<DiarizedSegment>,
    /// Sorted by total speaking time, descending.
    pub speakers: Vec<SpeakerSummary>,
    pub duration_seconds: Option<f64>,
    pub language_code: Option<String>,
}

/// One provider utterance, as returned by the poll endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: String,
    pub start: i64,
    pub end: i64,
    pub text: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Current state of an external diarization job.
#[derive(Debug, Clone, Deserialize)]
pub struct DiarizationJobStatus {
    pub status: String,
    #[serde(default)]
    pub utterances: Option<Vec<Utterance>>,
    #[serde(default)]
    pub audio_duration: Option<f64>,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait Diarizer: Send + Sync {
    async fn submit(&self, audio_url: &str) -> Result<String, PipelineError>;
    async fn poll(&self, job_id: &str) -> Result<DiarizationJobStatus, PipelineError>;
}

/// Poll an already-submitted diarization job on a fixed interval with durable
/// sleep between attempts so a suspended run holds no worker for up to
/// ~10 minutes.
///
/// Submission is not done here: the caller checkpoints the submit and its job
/// id separately, so a restart mid-poll resumes against the same job instead
/// of paying for a second one.
///
/// Raises on provider error or an exhausted attempt budget. Callers treat any
/// error here as "diarization unavailable" one level up; this function never
/// decides that policy itself.
pub async fn poll_diarization(
    diarizer: &dyn Diarizer,
    runtime: &WorkflowRuntime,
    run_id: &str,
    job_id: &str,
    schedule: PollSchedule,
) -> Result<DiarizationResult, PipelineError> {
    for attempt in 0..schedule.max_attempts {
        // Suspension state is checkpointed per attempt: a restart mid-wait
        // resumes the same deadline instead of restarting the interval.
        let sleep_step = format!("diarization_poll_sleep_{}", attempt);
        runtime
            .durable_sleep(run_id, &sleep_step, schedule.interval)
            .await
            .map_err(|e| PipelineError::service("diarization", e))?;

        let status = diarizer.poll(job_id).await?;
        match status.status.as_str() {
            "completed" => {
                let utterances = status.utterances.unwrap_or_default();
                info!(
                    "✅ Diarization completed after {} polls ({} utterances)",
                    attempt + 1,
                    utterances.len()
                );
                return Ok(build_result(
                    utterances,
                    status.audio_duration,
                    status.language_code,
                ));
            }
            "error" => {
                return Err(PipelineError::service(
                    "diarization",
                    status.error.unwrap_or_else(|| "unknown provider error".to_string()),
                ));
            }
            other => {
                if attempt % 20 == 19 {
                    info!("⏳ Diarization job {} still '{}' after {} polls", job_id, other, attempt + 1);
                }
            }
        }
    }

    Err(PipelineError::DiarizationTimeout {
        attempts: schedule.max_attempts,
    })
}

/// Convert provider utterances into internal segments and per-speaker
/// aggregates. Percentages are rounded with largest-remainder correction so
/// they always sum to exactly 100.
pub fn build_result(
    utterances: Vec<Utterance>,
    duration_seconds: Option<f64>,
    language_code: Option<String>,
) -> DiarizationResult {
    let segments: Vec<DiarizedSegment> = utterances
        .into_iter()
        .map(|u| DiarizedSegment {
            speaker_label: u.speaker,
            start_ms: u.start,
            end_ms: u.end,
            text: u.text,
            confidence: u.confidence,
        })
        .collect();

    let mut totals: Vec<(String, i64, i64)> = Vec::new();
    for segment in &segments {
        let speaking_ms = (segment.end_ms - segment.start_ms).max(0);
        match totals.iter_mut().find(|(label, _, _)| label == &segment.speaker_label) {
            Some((_, total, count)) => {
                *total += speaking_ms;
                *count += 1;
            }
            None => totals.push((segment.speaker_label.clone(), speaking_ms, 1)),
        }
    }

    totals.sort_by(|a, b| b.1.cmp(&a.1));
    let grand_total: i64 = totals.iter().map(|(_, total, _)| total).sum();

    let mut speakers: Vec<SpeakerSummary> = Vec::with_capacity(totals.len());
    if grand_total > 0 {
        // Floor each share, then hand out the remaining points to the
        // largest fractional remainders so the column sums to 100.
        let shares: Vec<f64> = totals
            .iter()
            .map(|(_, total, _)| *total as f64 * 100.0 / grand_total as f64)
            .collect();
        let mut floors: Vec<i64> = shares.iter().map(|s| s.floor() as i64).collect();
        let mut leftover = 100 - floors.iter().sum::<i64>();
        let mut order: Vec<usize> = (0..shares.len()).collect();
        order.sort_by(|&a, &b| {
            let fa = shares[a] - shares[a].floor();
            let fb = shares[b] - shares[b].floor();
            fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
        });
        for idx in order {
            if leftover == 0 {
                break;
            }
            floors[idx] += 1;
            leftover -= 1;
        }
        for ((label, total, count), pct) in totals.into_iter().zip(floors) {
            speakers.push(SpeakerSummary {
                speaker_label: label,
                total_speaking_time_ms: total,
                segment_count: count,
                speaking_percentage: pct,
            });
        }
    } else {
        for (label, total, count) in totals {
            speakers.push(SpeakerSummary {
                speaker_label: label,
                total_speaking_time_ms: total,
                segment_count: count,
                speaking_percentage: 0,
            });
        }
    }

    DiarizationResult {
        segments,
        speakers,
        duration_seconds,
        language_code,
    }
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
struct SubmitRequest<'a> {
    audio_url: &'a str,
    speaker_labels: bool,
    punctuate: bool,
}

#[derive(Deserialize, Debug)]
struct SubmitResponse {
    id: String,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

/// HTTP diarization client (AssemblyAI-compatible submit/poll endpoints).
#[derive(Debug, Clone)]
pub struct HttpDiarizer {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpDiarizer {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.diarization.dev/v2".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("DIARIZATION_API_KEY").ok()?;
        let mut client = Self::new(api_key);
        if let Ok(url) = std::env::var("DIARIZATION_BASE_URL") {
            client = client.with_base_url(url);
        }
        Some(client)
    }
}

#[async_trait]
impl Diarizer for HttpDiarizer {
    async fn submit(&self, audio_url: &str) -> Result<String, PipelineError> {
        let url = format!("{}/transcript", self.base_url);
        let request_body = SubmitRequest {
            audio_url,
            speaker_labels: true,
            punctuate: true,
        };

        let response = self
            .client
            .post(&url)
            .header("authorization", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| PipelineError::service("diarization", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Diarization submit failed: HTTP {} {}", status, body);
            return Err(PipelineError::service(
                "diarization",
                format!("submit failed: HTTP {}", status),
            ));
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::service("diarization", format!("bad response: {}", e)))?;
        Ok(parsed.id)
    }

    async fn poll(&self, job_id: &str) -> Result<DiarizationJobStatus, PipelineError> {
        let url = format!(
            "{}/transcript/{}",
            self.base_url,
            urlencoding::encode(job_id)
        );

        let response = self
            .client
            .get(&url)
            .header("authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| PipelineError::service("diarization", e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::service(
                "diarization",
                format!("poll failed: HTTP {}", response.status()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::service("diarization", format!("bad response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{MemoryCheckpointStore, WorkflowRuntime};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fake provider that replays a fixed sequence of poll responses.
    struct ScriptedDiarizer {
        statuses: Vec<DiarizationJobStatus>,
        polls: AtomicUsize,
    }

    impl ScriptedDiarizer {
        fn new(statuses: Vec<DiarizationJobStatus>) -> Self {
            Self {
                statuses,
                polls: AtomicUsize::new(0),
            }
        }

        fn processing() -> DiarizationJobStatus {
            DiarizationJobStatus {
                status: "processing".to_string(),
                utterances: None,
                audio_duration: None,
                language_code: None,
                error: None,
            }
        }
    }

    #[async_trait]
    impl Diarizer for ScriptedDiarizer {
        async fn submit(&self, _audio_url: &str) -> Result<String, PipelineError> {
            Ok("job-1".to_string())
        }

        async fn poll(&self, _job_id: &str) -> Result<DiarizationJobStatus, PipelineError> {
            let attempt = self.polls.fetch_add(1, Ordering::SeqCst);
            let last = self.statuses.len() - 1;
            Ok(self.statuses[attempt.min(last)].clone())
        }
    }

    fn fast_schedule(max_attempts: u32) -> PollSchedule {
        PollSchedule {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    fn test_runtime() -> WorkflowRuntime {
        WorkflowRuntime::new(Arc::new(MemoryCheckpointStore::new()))
    }

    #[tokio::test]
    async fn polling_returns_result_once_job_completes() {
        let diarizer = ScriptedDiarizer::new(vec![
            ScriptedDiarizer::processing(),
            ScriptedDiarizer::processing(),
            DiarizationJobStatus {
                status: "completed".to_string(),
                utterances: Some(vec![utterance("A", 0, 1_000)]),
                audio_duration: Some(1.0),
                language_code: Some("en".to_string()),
                error: None,
            },
        ]);

        let runtime = test_runtime();
        let result = poll_diarization(&diarizer, &runtime, "run-d1", "job-1", fast_schedule(10))
            .await
            .unwrap();

        assert_eq!(diarizer.polls.load(Ordering::SeqCst), 3);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.language_code.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn provider_error_status_surfaces_as_service_error() {
        let diarizer = ScriptedDiarizer::new(vec![DiarizationJobStatus {
            status: "error".to_string(),
            utterances: None,
            audio_duration: None,
            language_code: None,
            error: Some("audio file unreadable".to_string()),
        }]);

        let runtime = test_runtime();
        let err = poll_diarization(&diarizer, &runtime, "run-d2", "job-1", fast_schedule(10))
            .await
            .unwrap_err();

        match err {
            PipelineError::Service { service, message } => {
                assert_eq!(service, "diarization");
                assert!(message.contains("audio file unreadable"));
            }
            other => panic!("expected service error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn exhausted_poll_budget_times_out() {
        let diarizer = ScriptedDiarizer::new(vec![ScriptedDiarizer::processing()]);

        let runtime = test_runtime();
        let err = poll_diarization(&diarizer, &runtime, "run-d3", "job-1", fast_schedule(4))
            .await
            .unwrap_err();

        assert_eq!(diarizer.polls.load(Ordering::SeqCst), 4);
        match err {
            PipelineError::DiarizationTimeout { attempts } => assert_eq!(attempts, 4),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    fn utterance(speaker: &str, start: i64, end: i64) -> Utterance {
        Utterance {
            speaker: speaker.to_string(),
            start,
            end,
            text: format!("{} speaking", speaker),
            confidence: 0.9,
        }
    }

    #[test]
    fn percentages_sum_to_100_for_60_40_split() {
        let result = build_result(
            vec![utterance("A", 0, 60_000), utterance("B", 60_000, 100_000)],
            Some(100.0),
            None,
        );

        assert_eq!(result.speakers.len(), 2);
        assert_eq!(result.speakers[0].speaker_label, "A");
        assert_eq!(result.speakers[0].speaking_percentage, 60);
        assert_eq!(result.speakers[1].speaker_label, "B");
        assert_eq!(result.speakers[1].speaking_percentage, 40);
    }

    #[test]
    fn percentages_sum_to_100_for_three_way_split() {
        let result = build_result(
            vec![
                utterance("A", 0, 1_000),
                utterance("B", 1_000, 2_000),
                utterance("C", 2_000, 3_000),
            ],
            None,
            None,
        );

        let sum: i64 = result.speakers.iter().map(|s| s.speaking_percentage).sum();
        assert_eq!(sum, 100);
    }

    #[test]
    fn speakers_sorted_by_speaking_time_descending() {
        let result = build_result(
            vec![
                utterance("quiet", 0, 5_000),
                utterance("loud", 5_000, 60_000),
                utterance("quiet", 60_000, 62_000),
            ],
            None,
            None,
        );

        assert_eq!(result.speakers[0].speaker_label, "loud");
        assert_eq!(result.speakers[1].speaker_label, "quiet");
        assert_eq!(result.speakers[1].segment_count, 2);
    }

    #[test]
    fn empty_utterances_produce_empty_result() {
        let result = build_result(vec![], None, None);
        assert!(result.segments.is_empty());
        assert!(result.speakers.is_empty());
    }
}
