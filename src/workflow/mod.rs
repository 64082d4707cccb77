pub mod question_ctx;
pub mod question_flow;

pub use question_ctx::AttemptCtx;
pub use question_flow::{AttemptOutcome, AttemptState, QuestionFlow};
