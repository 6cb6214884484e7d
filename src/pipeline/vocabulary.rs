// Vocabulary correction - canonical term substitution over transcripts
use crate::adapters::transcription::TranscriptionResult;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One organization vocabulary entry: the canonical spelling plus the
/// variants transcription engines tend to produce for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyTerm {
    pub canonical_term: String,
    pub variations: Vec<String>,
}

/// Replace known variations with their canonical terms, case-insensitively
/// and on word boundaries only ("KUBERNETESX" never matches "KUBERNETES").
pub fn correct_text(text: &str, terms: &[VocabularyTerm]) -> String {
    let mut corrected = text.to_string();
    for term in terms {
        for variation in term.variations.iter().chain(std::iter::once(&term.canonical_term)) {
            if variation.is_empty() {
                continue;
            }
            let pattern = format!(r"\b{}\b", regex::escape(variation));
            let re = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(re) => re,
                Err(e) => {
                    warn!("Skipping unusable vocabulary variation '{}': {}", variation, e);
                    continue;
                }
            };
            corrected = re
                .replace_all(&corrected, term.canonical_term.as_str())
                .into_owned();
        }
    }
    corrected
}

/// Apply corrections to the full transcript and to every segment's text
/// independently. Segment text is corrected in place, never re-derived from
/// the full transcript.
pub fn correct_transcription(
    transcription: &TranscriptionResult,
    terms: &[VocabularyTerm],
) -> TranscriptionResult {
    if terms.is_empty() {
        return transcription.clone();
    }

    let mut corrected = transcription.clone();
    corrected.text = correct_text(&transcription.text, terms);
    for segment in &mut corrected.segments {
        segment.text = correct_text(&segment.text, terms);
    }
    corrected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::transcription::TranscriptSegment;

    fn kubernetes_term() -> VocabularyTerm {
        VocabularyTerm {
            canonical_term: "Kubernetes".to_string(),
            variations: vec!["KUBERNETES".to_string(), "kube nets".to_string()],
        }
    }

    #[test]
    fn corrects_case_insensitively_on_word_boundaries() {
        let corrected = correct_text("We use KUBERNETES daily", &[kubernetes_term()]);
        assert_eq!(corrected, "We use Kubernetes daily");
    }

    #[test]
    fn does_not_match_inside_longer_words() {
        let corrected = correct_text("KUBERNETESX is not a word", &[kubernetes_term()]);
        assert_eq!(corrected, "KUBERNETESX is not a word");
    }

    #[test]
    fn corrects_multi_word_variations() {
        let corrected = correct_text("deployed to kube nets yesterday", &[kubernetes_term()]);
        assert_eq!(corrected, "deployed to Kubernetes yesterday");
    }

    #[test]
    fn corrects_full_text_and_segments_independently() {
        let transcription = TranscriptionResult {
            text: "We use KUBERNETES daily".to_string(),
            segments: vec![
                TranscriptSegment {
                    start_time: 0.0,
                    end_time: 2.0,
                    text: "We use KUBERNETES".to_string(),
                },
                TranscriptSegment {
                    start_time: 2.0,
                    end_time: 3.0,
                    text: "daily".to_string(),
                },
            ],
            duration_seconds: 3.0,
            language: Some("en".to_string()),
        };

        let corrected = correct_transcription(&transcription, &[kubernetes_term()]);
        assert_eq!(corrected.text, "We use Kubernetes daily");
        assert_eq!(corrected.segments[0].text, "We use Kubernetes");
        assert_eq!(corrected.segments[1].text, "daily");
    }
}
