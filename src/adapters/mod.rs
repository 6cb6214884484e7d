// Service adapters - narrow interfaces the pipeline calls through steps
pub mod content_index;
pub mod diarization;
pub mod generation;
pub mod notify;
pub mod storage;
pub mod thumbnail;
pub mod transcription;

pub use content_index::{ContentIndex, HttpContentIndex, VideoIndexDocument};
pub use diarization::{
    poll_diarization, DiarizationResult, DiarizedSegment, Diarizer, HttpDiarizer, PollSchedule,
    SpeakerSummary,
};
pub use generation::{generate_structured, HttpGenerator, StructuredGenerator};
pub use notify::{Notification, Notifier, WebhookNotifier};
pub use storage::{HttpObjectStorage, ObjectStorage};
pub use thumbnail::{FfmpegThumbnailGenerator, ThumbnailGenerator};
pub use transcription::{
    HttpTranscriber, Transcriber, TranscriptSegment, TranscriptionHints, TranscriptionResult,
};
