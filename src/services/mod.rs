pub mod alignment_rules;
pub mod anchor_detector;
pub mod context_window;
pub mod deduplicator;
pub mod llm_service;
pub mod quality_validator;

pub use anchor_detector::AnchorDetector;
pub use llm_service::{DraftRequest, LlmDrafter, QuestionDrafter};
pub use quality_validator::{QualityValidator, RejectReason, CURRENT_RULE_VERSION};
