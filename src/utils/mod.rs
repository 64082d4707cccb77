pub mod fingerprint;
pub mod logging;
pub mod text;

pub use fingerprint::{fingerprint_segments, fingerprint_source};
pub use logging::truncate_text;
