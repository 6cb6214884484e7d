// Key-moment detection over timestamped transcripts
use crate::adapters::generation::{generate_structured, StructuredGenerator};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use tracing::info;

/// The generation prompt instructs the model to emit only moments at or
/// above this confidence; the pipeline trusts that filter and does not
/// re-apply it.
pub const MOMENT_CONFIDENCE_FLOOR: f64 = 60.0;

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 1000;
const MAX_EXCERPT_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentCategory {
    Decision,
    ActionItem,
    Question,
    Answer,
    Emphasis,
    Demonstration,
    Conclusion,
    Highlight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedMoment {
    pub title: String,
    pub description: Option<String>,
    pub start_time: f64,
    pub end_time: f64,
    pub category: MomentCategory,
    /// Clamped into [0, 100] before persistence.
    pub confidence: f64,
    pub excerpt: String,
}

/// Detect key moments with a single structured-generation call.
///
/// Returned moments are normalized for storage: confidence clamped into
/// [0, 100] and text fields truncated to column limits.
pub async fn detect_moments(
    generator: &dyn StructuredGenerator,
    timestamped_transcript: &str,
) -> Result<Vec<DetectedMoment>, PipelineError> {
    let system = "You find the key moments in meeting and video transcripts. \
        Always respond with the exact JSON shape requested and nothing else.";
    let prompt = format!(
        "Identify the key moments in this transcript: decisions, action items, \
         questions, answers, points of emphasis, demonstrations, conclusions, \
         and highlights.\n\n\
         Only include moments you are at least {}% confident about; omit \
         anything weaker.\n\n\
         Respond with a JSON array:\n\
         [{{\"title\": \"...\", \"description\": \"...\", \"start_time\": 0.0, \
         \"end_time\": 30.0, \"category\": \"decision\", \"confidence\": 85, \
         \"excerpt\": \"verbatim source text\"}}]\n\n\
         Valid categories: decision, action_item, question, answer, emphasis, \
         demonstration, conclusion, highlight.\n\nTRANSCRIPT:\n{}",
        MOMENT_CONFIDENCE_FLOOR as i64, timestamped_transcript
    );

    let moments: Vec<DetectedMoment> = generate_structured(generator, system, &prompt).await?;
    let normalized: Vec<DetectedMoment> = moments.into_iter().map(normalize).collect();

    info!("🔎 Detected {} key moments", normalized.len());
    Ok(normalized)
}

fn normalize(mut moment: DetectedMoment) -> DetectedMoment {
    moment.confidence = moment.confidence.clamp(0.0, 100.0);
    moment.title = truncate(&moment.title, MAX_TITLE_CHARS);
    moment.description = moment
        .description
        .map(|d| truncate(&d, MAX_DESCRIPTION_CHARS));
    moment.excerpt = truncate(&moment.excerpt, MAX_EXCERPT_CHARS);
    moment
}

/// Truncate on a char boundary to fit a storage column.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_confidence_and_truncates() {
        let moment = normalize(DetectedMoment {
            title: "t".repeat(500),
            description: Some("d".repeat(5000)),
            start_time: 0.0,
            end_time: 10.0,
            category: MomentCategory::Highlight,
            confidence: 140.0,
            excerpt: "e".repeat(5000),
        });

        assert_eq!(moment.confidence, 100.0);
        assert_eq!(moment.title.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(
            moment.description.unwrap().chars().count(),
            MAX_DESCRIPTION_CHARS
        );
        assert_eq!(moment.excerpt.chars().count(), MAX_EXCERPT_CHARS);
    }

    #[test]
    fn moment_categories_use_snake_case_wire_names() {
        let json = serde_json::to_string(&MomentCategory::ActionItem).unwrap();
        assert_eq!(json, "\"action_item\"");
        let parsed: MomentCategory = serde_json::from_str("\"demonstration\"").unwrap();
        assert_eq!(parsed, MomentCategory::Demonstration);
    }
}
