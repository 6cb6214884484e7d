// Structured AI generation adapter (messages API with JSON-mode prompts)
use crate::error::PipelineError;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Structured generation: prompt in, schema-conforming JSON out.
///
/// The trait speaks `serde_json::Value` so it stays object-safe; callers use
/// [`generate_structured`] for typed results.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate_json(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<serde_json::Value, PipelineError>;
}

/// Typed wrapper: generate JSON and deserialize it into `T`.
pub async fn generate_structured<T: DeserializeOwned>(
    generator: &dyn StructuredGenerator,
    system: &str,
    prompt: &str,
) -> Result<T, PipelineError> {
    let value = generator.generate_json(system, prompt).await?;
    serde_json::from_value(value)
        .map_err(|e| PipelineError::service("generation", format!("schema mismatch: {}", e)))
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerationRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<GenerationMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GenerationMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

/// Claude-messages-style generation client with exponential-backoff retry on
/// transient errors (connection failures, 429/5xx).
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl HttpGenerator {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: std::env::var("GENERATION_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-5".to_string()),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GENERATION_API_KEY").ok()?;
        let mut client = Self::new(api_key);
        if let Ok(url) = std::env::var("GENERATION_BASE_URL") {
            client = client.with_base_url(url);
        }
        Some(client)
    }

    /// Cheap reachability probe for health checks.
    pub async fn ping(&self) -> Result<(), String> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| format!("generation service unreachable: {}", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("generation service returned {}", response.status()))
        }
    }

    async fn send_prompt(&self, system: &str, prompt: &str) -> Result<String, String> {
        let request = GenerationRequest {
            model: self.model.clone(),
            max_tokens: 8192,
            messages: vec![GenerationMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            system: Some(system.to_string()),
            temperature: 0.2,
        };

        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(300)),
            ..Default::default()
        };

        // Retry logic for transient errors (503, 502, 429, connection errors)
        let operation = || async {
            let response = self
                .client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .timeout(Duration::from_secs(120))
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!("Generation API connection error (retrying): {}", e);
                        backoff::Error::transient(format!("Connection error: {}", e))
                    } else {
                        backoff::Error::permanent(format!("Request error: {}", e))
                    }
                })?;

            let status = response.status();
            let response_text = response
                .text()
                .await
                .map_err(|e| backoff::Error::permanent(format!("Failed to read response: {}", e)))?;

            if matches!(status.as_u16(), 429 | 500 | 502 | 503) {
                tracing::warn!("Generation API returned {} (retrying)", status);
                return Err(backoff::Error::transient(format!(
                    "API error ({}): {}",
                    status, response_text
                )));
            }

            if !status.is_success() {
                return Err(backoff::Error::permanent(format!(
                    "API error ({}): {}",
                    status, response_text
                )));
            }

            let parsed: GenerationResponse = serde_json::from_str(&response_text).map_err(|e| {
                backoff::Error::permanent(format!("Failed to parse response: {}", e))
            })?;

            for content in parsed.content {
                if let ResponseContent::Text { text } = content {
                    return Ok(text);
                }
            }
            Err(backoff::Error::permanent(
                "No text content in generation response".to_string(),
            ))
        };

        retry(backoff_config, operation).await
    }
}

#[async_trait]
impl StructuredGenerator for HttpGenerator {
    async fn generate_json(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<serde_json::Value, PipelineError> {
        let text = self
            .send_prompt(system, prompt)
            .await
            .map_err(|e| PipelineError::service("generation", e))?;

        let json_text = extract_json_block(&text);
        serde_json::from_str(json_text).map_err(|e| {
            PipelineError::service(
                "generation",
                format!("model did not return valid JSON: {}", e),
            )
        })
    }
}

#[async_trait]
impl crate::health::ServiceProbe for HttpGenerator {
    fn name(&self) -> &str {
        "generation"
    }

    async fn check(&self) -> Result<(), String> {
        self.ping().await
    }
}

/// Models often wrap JSON in markdown fences or prose; cut down to the
/// outermost JSON value before parsing.
fn extract_json_block(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_lang = after_fence
            .strip_prefix("json")
            .unwrap_or(after_fence)
            .trim_start();
        if let Some(end) = after_lang.find("```") {
            return after_lang[..end].trim();
        }
    }
    let object_start = trimmed.find('{');
    let array_start = trimmed.find('[');
    let start = match (object_start, array_start) {
        (Some(o), Some(a)) => Some(o.min(a)),
        (Some(o), None) => Some(o),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    };
    match start {
        Some(idx) => {
            let close = if trimmed.as_bytes()[idx] == b'{' { '}' } else { ']' };
            match trimmed.rfind(close) {
                Some(end) if end >= idx => &trimmed[idx..=end],
                _ => trimmed,
            }
        }
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nHope that helps!";
        assert_eq!(extract_json_block(text), "{\"a\": 1}");
    }

    #[test]
    fn extracts_bare_array_with_prose() {
        let text = "The moments are: [{\"title\": \"x\"}] as requested.";
        assert_eq!(extract_json_block(text), "[{\"title\": \"x\"}]");
    }

    #[test]
    fn passes_through_clean_json() {
        assert_eq!(extract_json_block("{\"ok\": true}"), "{\"ok\": true}");
    }
}
