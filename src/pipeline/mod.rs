// Video-intelligence pipeline: stages, extraction, and text utilities
pub mod analysis;
pub mod decisions;
pub mod moments;
pub mod title;
pub mod video;
pub mod vocabulary;

pub use video::{VideoPipeline, VideoPipelineInput, VideoPipelineOutput};

use crate::adapters::transcription::TranscriptionResult;

/// Render a transcript with segment timestamps for extraction prompts.
pub fn timestamped_transcript(transcription: &TranscriptionResult) -> String {
    if transcription.segments.is_empty() {
        return transcription.text.clone();
    }
    let mut out = String::with_capacity(transcription.text.len() + transcription.segments.len() * 12);
    for segment in &transcription.segments {
        out.push_str(&format!("[{:.1}s] {}\n", segment.start_time, segment.text.trim()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::transcription::TranscriptSegment;

    #[test]
    fn renders_segment_timestamps() {
        let transcription = TranscriptionResult {
            text: "hello world".to_string(),
            segments: vec![
                TranscriptSegment {
                    start_time: 0.0,
                    end_time: 1.5,
                    text: "hello".to_string(),
                },
                TranscriptSegment {
                    start_time: 1.5,
                    end_time: 3.0,
                    text: "world".to_string(),
                },
            ],
            duration_seconds: 3.0,
            language: None,
        };

        let rendered = timestamped_transcript(&transcription);
        assert_eq!(rendered, "[0.0s] hello\n[1.5s] world\n");
    }

    #[test]
    fn falls_back_to_full_text_without_segments() {
        let transcription = TranscriptionResult {
            text: "no segments here".to_string(),
            segments: vec![],
            duration_seconds: 0.0,
            language: None,
        };
        assert_eq!(timestamped_transcript(&transcription), "no segments here");
    }
}
