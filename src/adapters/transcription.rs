// Speech-to-text adapter
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// One timestamped span of transcript text. Start times are monotonically
/// non-decreasing across the list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

/// Output of the transcription step. Produced once, consumed read-only by
/// every later stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub duration_seconds: f64,
    pub language: Option<String>,
}

/// Bias hints passed to the transcription service: organization vocabulary
/// and known participant names improve recognition of proper nouns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionHints {
    pub vocabulary_terms: Vec<String>,
    pub participant_names: Vec<String>,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio_url: &str,
        hints: &TranscriptionHints,
    ) -> Result<TranscriptionResult, PipelineError>;
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
struct TranscriptionRequest<'a> {
    audio_url: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    boost_phrases: Vec<String>,
    response_format: &'a str,
    timestamp_granularity: &'a str,
}

#[derive(Deserialize, Debug)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    segments: Vec<ApiSegment>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiSegment {
    start: f64,
    end: f64,
    text: String,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

/// HTTP speech-to-text client (Whisper-compatible transcription endpoint).
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpTranscriber {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.transcription.dev/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Build from environment; None when credentials are absent so the
    /// pipeline can raise the fatal misconfiguration itself.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("TRANSCRIPTION_API_KEY").ok()?;
        let mut client = Self::new(api_key);
        if let Ok(url) = std::env::var("TRANSCRIPTION_BASE_URL") {
            client = client.with_base_url(url);
        }
        Some(client)
    }

    /// Cheap reachability probe for health checks.
    pub async fn ping(&self) -> Result<(), String> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| format!("transcription service unreachable: {}", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("transcription service returned {}", response.status()))
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        audio_url: &str,
        hints: &TranscriptionHints,
    ) -> Result<TranscriptionResult, PipelineError> {
        let url = format!("{}/transcriptions", self.base_url);

        let mut boost_phrases = hints.vocabulary_terms.clone();
        boost_phrases.extend(hints.participant_names.iter().cloned());

        let request_body = TranscriptionRequest {
            audio_url,
            boost_phrases,
            response_format: "verbose_json",
            timestamp_granularity: "segment",
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| PipelineError::service("transcription", e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PipelineError::NotFound(format!(
                "audio not found at {}",
                audio_url
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::service(
                "transcription",
                format!("HTTP {}: {}", status, body),
            ));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::service("transcription", format!("bad response: {}", e)))?;

        let segments: Vec<TranscriptSegment> = parsed
            .segments
            .into_iter()
            .map(|s| TranscriptSegment {
                start_time: s.start,
                end_time: s.end,
                text: s.text,
            })
            .collect();

        // Estimate duration from the last segment when the API omits it.
        let duration_seconds = parsed
            .duration
            .or_else(|| segments.last().map(|s| s.end_time))
            .unwrap_or(0.0);

        Ok(TranscriptionResult {
            text: parsed.text,
            segments,
            duration_seconds,
            language: parsed.language,
        })
    }
}
