// Decision extraction with confidence-threshold persistence
use crate::adapters::generation::{generate_structured, StructuredGenerator};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Persistence floor: decisions below this confidence are logged but never
/// written.
pub const DECISION_PERSIST_THRESHOLD: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionCategory {
    Technical,
    Process,
    Product,
    Team,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Proposed,
    Decided,
    Revisited,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Decider,
    Participant,
    Mentioned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionParticipant {
    pub name: String,
    pub role: ParticipantRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDecision {
    pub summary: String,
    pub context: Option<String>,
    pub reasoning: Option<String>,
    pub start_time: f64,
    pub end_time: f64,
    pub category: DecisionCategory,
    pub status: DecisionStatus,
    /// 0-100.
    pub confidence: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub participants: Vec<DecisionParticipant>,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Extraction outcome with threshold diagnostics, so "model found nothing"
/// is distinguishable from "model found things but they were filtered".
#[derive(Debug, Clone)]
pub struct DecisionExtraction {
    pub persistable: Vec<ExtractedDecision>,
    pub total_extracted: usize,
    pub above_threshold: usize,
    pub below_threshold: usize,
}

/// Extract decisions with a single structured-generation call.
///
/// The prompt asks the model to be maximally inclusive (borderline and
/// implicit agreements too); filtering is this side's responsibility.
pub async fn extract_decisions(
    generator: &dyn StructuredGenerator,
    timestamped_transcript: &str,
) -> Result<DecisionExtraction, PipelineError> {
    let system = "You extract decisions from meeting and video transcripts. \
        Always respond with the exact JSON shape requested and nothing else.";
    let prompt = format!(
        "Extract every decision from this transcript. Be maximally inclusive: \
         include borderline calls, implicit agreements, and tentative \
         proposals, with an honest confidence score from 0 to 100 for each.\n\n\
         Respond with a JSON array:\n\
         [{{\"summary\": \"...\", \"context\": \"...\", \"reasoning\": \"...\", \
         \"start_time\": 0.0, \"end_time\": 45.0, \"category\": \"technical\", \
         \"status\": \"decided\", \"confidence\": 80, \"tags\": [\"...\"], \
         \"participants\": [{{\"name\": \"...\", \"role\": \"decider\"}}], \
         \"references\": []}}]\n\n\
         Valid categories: technical, process, product, team, other. \
         Valid statuses: proposed, decided, revisited, superseded. \
         Valid participant roles: decider, participant, mentioned.\n\n\
         TRANSCRIPT:\n{}",
        timestamped_transcript
    );

    let decisions: Vec<ExtractedDecision> =
        generate_structured(generator, system, &prompt).await?;
    Ok(filter_for_persistence(decisions))
}

/// Split extracted decisions at the persistence threshold, logging the
/// verdict for every decision returned.
pub fn filter_for_persistence(decisions: Vec<ExtractedDecision>) -> DecisionExtraction {
    let total_extracted = decisions.len();
    let mut persistable = Vec::new();
    let mut below_threshold = 0usize;

    for decision in decisions {
        let confidence = decision.confidence.clamp(0.0, 100.0);
        if confidence >= DECISION_PERSIST_THRESHOLD {
            debug!(
                "Decision kept (confidence {:.0} >= {:.0}): {}",
                confidence, DECISION_PERSIST_THRESHOLD, decision.summary
            );
            persistable.push(ExtractedDecision {
                confidence,
                ..decision
            });
        } else {
            debug!(
                "Decision filtered (confidence {:.0} < {:.0}): {}",
                confidence, DECISION_PERSIST_THRESHOLD, decision.summary
            );
            below_threshold += 1;
        }
    }

    let above_threshold = persistable.len();
    info!(
        "⚖️ Decision extraction: totalExtracted={}, aboveThreshold={}, belowThreshold={}",
        total_extracted, above_threshold, below_threshold
    );

    DecisionExtraction {
        persistable,
        total_extracted,
        above_threshold,
        below_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(confidence: f64) -> ExtractedDecision {
        ExtractedDecision {
            summary: format!("decision at {}", confidence),
            context: None,
            reasoning: None,
            start_time: 0.0,
            end_time: 10.0,
            category: DecisionCategory::Technical,
            status: DecisionStatus::Decided,
            confidence,
            tags: vec![],
            participants: vec![],
            references: vec![],
        }
    }

    #[test]
    fn filters_below_threshold_and_reports_counts() {
        let extraction = filter_for_persistence(vec![
            decision(10.0),
            decision(29.0),
            decision(30.0),
            decision(55.0),
            decision(95.0),
        ]);

        assert_eq!(extraction.total_extracted, 5);
        assert_eq!(extraction.above_threshold, 3);
        assert_eq!(extraction.below_threshold, 2);
        assert_eq!(extraction.persistable.len(), 3);
        assert!(extraction
            .persistable
            .iter()
            .all(|d| d.confidence >= DECISION_PERSIST_THRESHOLD));
    }

    #[test]
    fn threshold_is_inclusive() {
        let extraction = filter_for_persistence(vec![decision(30.0)]);
        assert_eq!(extraction.above_threshold, 1);
    }

    #[test]
    fn decision_enums_use_snake_case_wire_names() {
        let parsed: DecisionStatus = serde_json::from_str("\"superseded\"").unwrap();
        assert_eq!(parsed, DecisionStatus::Superseded);
        let parsed: ParticipantRole = serde_json::from_str("\"decider\"").unwrap();
        assert_eq!(parsed, ParticipantRole::Decider);
    }
}
