// Title heuristics and AI title generation
use crate::adapters::generation::StructuredGenerator;
use crate::error::PipelineError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

/// How much transcript the title prompt sees.
const TITLE_CONTEXT_CHARS: usize = 3000;

lazy_static! {
    /// Filename with a media extension ("IMG_1234.mp4", "standup.mov").
    static ref FILE_EXTENSION: Regex =
        Regex::new(r"(?i)\.(mp4|mov|avi|mkv|webm|m4v|m4a|mp3|wav|flac|ogg)$").unwrap();
    /// Camera-roll names ("IMG_1234", "DSC00042", "GOPR0027", "DJI_0001").
    static ref CAMERA_ROLL: Regex =
        Regex::new(r"(?i)^(img|vid|dsc|mvi|mov|gopr|gp|dji|rec)[-_ ]?\d+").unwrap();
    /// Generic recording words with an optional trailing number/date.
    static ref GENERIC_WITH_DIGITS: Regex = Regex::new(
        r"(?i)^(screen[ _-]?recording|zoom[ _-]?meeting|meeting[ _-]?recording|new[ _-]?recording|untitled|recording|meeting|video|clip|capture|audio)([ _-]+[\d\s:_.-]+)?$"
    )
    .unwrap();
    /// Pure timestamp strings ("20240115_143022", "2024-01-15 14.30.22").
    static ref TIMESTAMP: Regex = Regex::new(
        r"^\d{4}[-_. ]?\d{2}[-_. ]?\d{2}([ T_-]?\d{2}[:._]?\d{2}([:._]?\d{2})?)?$"
    )
    .unwrap();
    /// Hash-like identifiers (hex digests, uuids).
    static ref HASH_LIKE: Regex =
        Regex::new(r"(?i)^[0-9a-f]{16,}$|^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
            .unwrap();
}

/// Does the supplied title look auto-generated (or is it missing)?
///
/// Filename-ish patterns, camera-roll names, generic words with trailing
/// digits, timestamps, and hash-like strings all qualify. A human title like
/// "Q3 Planning Sync" does not.
pub fn title_needs_generation(title: &str) -> bool {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return true;
    }
    FILE_EXTENSION.is_match(trimmed)
        || CAMERA_ROLL.is_match(trimmed)
        || GENERIC_WITH_DIGITS.is_match(trimmed)
        || TIMESTAMP.is_match(trimmed)
        || HASH_LIKE.is_match(trimmed)
}

#[derive(Deserialize)]
struct TitleResponse {
    title: String,
}

/// Generate a concise human title from the opening of the transcript.
pub async fn generate_title(
    generator: &dyn StructuredGenerator,
    transcript: &str,
) -> Result<String, PipelineError> {
    let excerpt: String = transcript.chars().take(TITLE_CONTEXT_CHARS).collect();

    let system = "You title recorded meetings and videos. \
        Respond with JSON only: {\"title\": \"...\"}.";
    let prompt = format!(
        "Write a concise, specific title (under 60 characters) for a recording \
         that begins like this:\n\n{}\n\n\
         Respond with JSON: {{\"title\": \"...\"}}",
        excerpt
    );

    let value = generator.generate_json(system, &prompt).await?;
    let parsed: TitleResponse = serde_json::from_value(value)
        .map_err(|e| PipelineError::service("generation", format!("bad title response: {}", e)))?;

    let title = parsed.title.trim().to_string();
    if title.is_empty() {
        return Err(PipelineError::service("generation", "empty title returned"));
    }
    Ok(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_titles_need_generation() {
        assert!(title_needs_generation("IMG_1234.mp4"));
        assert!(title_needs_generation("standup-recording.mov"));
        assert!(title_needs_generation("IMG_2041"));
    }

    #[test]
    fn generic_and_timestamp_titles_need_generation() {
        assert!(title_needs_generation("Screen Recording 2024"));
        assert!(title_needs_generation("Zoom Meeting 2024-01-15"));
        assert!(title_needs_generation("20240115_143022"));
        assert!(title_needs_generation(""));
        assert!(title_needs_generation("   "));
    }

    #[test]
    fn hash_like_titles_need_generation() {
        assert!(title_needs_generation("3f9ac2d81b44e0a7c6d5"));
        assert!(title_needs_generation("550e8400-e29b-41d4-a716-446655440000"));
    }

    #[test]
    fn human_titles_are_kept() {
        assert!(!title_needs_generation("Q3 Planning Sync"));
        assert!(!title_needs_generation("Design review: onboarding flow"));
        assert!(!title_needs_generation("1:1 with Sam"));
    }
}
