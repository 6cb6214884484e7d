// Pipeline error taxonomy - fatal vs recoverable drives workflow control flow
use thiserror::Error;

/// Every failure the pipeline can surface.
///
/// Fatal variants abort the run outright (no retry will help); everything
/// else is recoverable and flows into required/optional step handling.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{service} error: {message}")]
    Service { service: String, message: String },

    #[error("diarization did not complete after {attempts} polls")]
    DiarizationTimeout { attempts: u32 },

    #[error("step '{step}' aborted: {message}")]
    FatalStep { step: String, message: String },

    #[error("step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl PipelineError {
    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Service {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Fatal errors indicate a misconfigured deployment or a nonexistent
    /// resource. Retrying the run cannot fix either.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingConfiguration(_)
                | PipelineError::NotFound(_)
                | PipelineError::FatalStep { .. }
        )
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::service("http", e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_and_not_found_are_fatal() {
        assert!(PipelineError::MissingConfiguration("GENERATION_API_KEY".to_string()).is_fatal());
        assert!(PipelineError::NotFound("video".to_string()).is_fatal());
        assert!(PipelineError::FatalStep {
            step: "transcribe".to_string(),
            message: "missing configuration: transcription adapter".to_string(),
        }
        .is_fatal());
    }

    #[test]
    fn service_errors_are_recoverable() {
        assert!(!PipelineError::service("stt", "HTTP 503").is_fatal());
        assert!(!PipelineError::DiarizationTimeout { attempts: 200 }.is_fatal());
        assert!(!PipelineError::Database("connection reset".to_string()).is_fatal());
    }
}
