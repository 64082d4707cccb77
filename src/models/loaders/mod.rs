pub mod json_loader;

pub use json_loader::{list_transcript_files, load_transcript, TranscriptFile};
