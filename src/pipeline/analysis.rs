// AI analysis - summary, tags, action items, chapters
use crate::adapters::generation::{generate_structured, StructuredGenerator};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub text: String,
    pub timestamp_seconds: Option<f64>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub summary: String,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub tags: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub chapters: Vec<Chapter>,
}

#[derive(Deserialize)]
struct SummaryResponse {
    summary: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    tags: Vec<String>,
}

/// Run the four analysis extractions over a timestamped transcript.
///
/// The summary call is required; a failure there fails the stage. Tag,
/// action-item, and chapter extraction are each independently fault-tolerant
/// and degrade to empty results.
pub async fn run_analysis(
    generator: &dyn StructuredGenerator,
    timestamped_transcript: &str,
) -> Result<AnalysisResult, PipelineError> {
    let system = "You analyze meeting and video transcripts. \
        Always respond with the exact JSON shape requested and nothing else.";

    let summary_prompt = format!(
        "Summarize this transcript in 2-4 paragraphs covering the purpose, \
         the main threads of discussion, and the outcome.\n\n\
         Respond with JSON: {{\"summary\": \"...\"}}\n\nTRANSCRIPT:\n{}",
        timestamped_transcript
    );
    let summary: SummaryResponse =
        generate_structured(generator, system, &summary_prompt).await?;

    let tags_prompt = format!(
        "Produce 5-10 short topical tags for this transcript.\n\n\
         Respond with JSON: {{\"tags\": [\"...\"]}}\n\nTRANSCRIPT:\n{}",
        timestamped_transcript
    );
    let tags = match generate_structured::<TagsResponse>(generator, system, &tags_prompt).await {
        Ok(response) => response.tags,
        Err(e) => {
            warn!("⚠️ Tag extraction failed, continuing without tags: {}", e);
            Vec::new()
        }
    };

    let actions_prompt = format!(
        "List the action items in this transcript. For each, give the text, \
         the timestamp in seconds where it was raised (null if unclear), and \
         a priority of high/medium/low (null if unclear).\n\n\
         Respond with a JSON array: \
         [{{\"text\": \"...\", \"timestamp_seconds\": 12.5, \"priority\": \"high\"}}]\n\n\
         TRANSCRIPT:\n{}",
        timestamped_transcript
    );
    let action_items =
        match generate_structured::<Vec<ActionItem>>(generator, system, &actions_prompt).await {
            Ok(items) => items,
            Err(e) => {
                warn!("⚠️ Action-item extraction failed, continuing without: {}", e);
                Vec::new()
            }
        };

    let chapters_prompt = format!(
        "Segment this transcript into chapters. For each chapter give a short \
         title, a one-sentence summary, and start/end times in seconds that \
         follow the transcript timestamps.\n\n\
         Respond with a JSON array: \
         [{{\"title\": \"...\", \"summary\": \"...\", \"start_time\": 0.0, \"end_time\": 120.0}}]\n\n\
         TRANSCRIPT:\n{}",
        timestamped_transcript
    );
    let chapters =
        match generate_structured::<Vec<Chapter>>(generator, system, &chapters_prompt).await {
            Ok(chapters) => chapters,
            Err(e) => {
                warn!("⚠️ Chapter extraction failed, continuing without: {}", e);
                Vec::new()
            }
        };

    info!(
        "🧠 Analysis complete: {} tags, {} action items, {} chapters",
        tags.len(),
        action_items.len(),
        chapters.len()
    );

    Ok(AnalysisResult {
        summary: summary.summary,
        tags,
        action_items,
        chapters,
    })
}
