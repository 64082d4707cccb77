pub mod anchor;
pub mod loaders;
pub mod output;
pub mod question;
pub mod record;
pub mod transcript;
pub mod version;
pub mod window;

pub use anchor::{Anchor, AnchorType};
pub use loaders::{list_transcript_files, load_transcript, TranscriptFile};
pub use output::{AnchorStatistics, OutputQuestion, OutputStatus, QuizOutput};
pub use question::{format_mmss, CandidateQuestion, OptionKey, QuestionOptions, ValidatedQuestion};
pub use record::{
    compute_evidence_hash, AnchorRecord, GenerationMode, GenerationRecord, GenerationStatus,
    GenerationSummary, QualityMetrics, SCHEMA_VERSION,
};
pub use transcript::{excerpt_between, validate_segments, video_duration, TranscriptSegment};
pub use version::RuleVersion;
pub use window::ContextWindow;
