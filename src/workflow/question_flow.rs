//! 单个 (锚点, 变体) 的出题流程 - 流程层
//!
//! 核心职责：定义"一道题"的状态机
//!
//! ```text
//! DRAFTING -> VALIDATING -> ACCEPTED
//!                        -> REJECTED(reason) -> DRAFTING (还有预算)
//!                                            -> ABANDONED (预算耗尽)
//! ```
//!
//! 起草失败同样消耗一次尝试，按可恢复的拒绝处理。

use std::fmt;
use tracing::{debug, warn};

use crate::models::anchor::Anchor;
use crate::models::question::{CandidateQuestion, ValidatedQuestion};
use crate::models::window::ContextWindow;
use crate::services::deduplicator::is_duplicate;
use crate::services::llm_service::{DraftRequest, QuestionDrafter};
use crate::services::quality_validator::{QualityValidator, RejectReason};
use crate::utils::truncate_text;
use crate::workflow::question_ctx::AttemptCtx;

/// 状态机状态
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    Drafting,
    Validating,
    Accepted,
    Rejected(String),
    Abandoned,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::Drafting => f.write_str("DRAFTING"),
            AttemptState::Validating => f.write_str("VALIDATING"),
            AttemptState::Accepted => f.write_str("ACCEPTED"),
            AttemptState::Rejected(code) => write!(f, "REJECTED({})", code),
            AttemptState::Abandoned => f.write_str("ABANDONED"),
        }
    }
}

/// 终态
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Accepted {
        question: ValidatedQuestion,
        attempts: u32,
        /// 接受之前被拒绝的原因
        rejection_codes: Vec<String>,
    },
    Abandoned {
        attempts: u32,
        rejection_codes: Vec<String>,
    },
}

impl AttemptOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            AttemptOutcome::Accepted { attempts, .. } | AttemptOutcome::Abandoned { attempts, .. } => *attempts,
        }
    }

    pub fn rejection_codes(&self) -> &[String] {
        match self {
            AttemptOutcome::Accepted { rejection_codes, .. }
            | AttemptOutcome::Abandoned { rejection_codes, .. } => rejection_codes,
        }
    }
}

/// 出题流程
///
/// - 驱动单个 (锚点, 变体) 的起草、校验、去重与重试
/// - 不决定处理哪些锚点，也不决定何时停止整批
/// - 只依赖业务能力（services）
pub struct QuestionFlow<'a, D: QuestionDrafter> {
    drafter: &'a D,
    validator: &'a QualityValidator,
}

impl<'a, D: QuestionDrafter> QuestionFlow<'a, D> {
    pub fn new(drafter: &'a D, validator: &'a QualityValidator) -> Self {
        Self { drafter, validator }
    }

    pub async fn run(
        &self,
        ctx: &AttemptCtx,
        anchor: &Anchor,
        window: &ContextWindow,
        excerpt: &str,
        accepted: &[ValidatedQuestion],
    ) -> AttemptOutcome {
        let request = DraftRequest::new(anchor, excerpt, ctx.variant);
        let mut rejection_codes = Vec::new();

        for attempt in 1..=ctx.max_attempts {
            self.transition(ctx, attempt, &AttemptState::Drafting);
            let candidate = match self.drafter.draft(&request).await {
                Ok(candidate) => candidate,
                Err(failure) => {
                    warn!("{} 第 {} 次起草失败: {}", ctx, attempt, failure);
                    rejection_codes.push(failure.code().to_string());
                    continue;
                }
            };

            self.transition(ctx, attempt, &AttemptState::Validating);
            match self.check(&candidate, anchor, excerpt, accepted) {
                Ok(()) => {
                    self.transition(ctx, attempt, &AttemptState::Accepted);
                    debug!("{} ✓ 接受: {}", ctx, truncate_text(&candidate.stem, 60));
                    let question = ValidatedQuestion::accept(candidate, anchor.start_seconds, window.clone());
                    return AttemptOutcome::Accepted {
                        question,
                        attempts: attempt,
                        rejection_codes,
                    };
                }
                Err(reason) => {
                    self.transition(ctx, attempt, &AttemptState::Rejected(reason.code().to_string()));
                    warn!(
                        "{} 第 {} 次被拒绝 ({}): {}",
                        ctx,
                        attempt,
                        reason,
                        truncate_text(&candidate.stem, 60)
                    );
                    rejection_codes.push(reason.code().to_string());
                }
            }
        }

        self.transition(ctx, ctx.max_attempts, &AttemptState::Abandoned);
        warn!("{} ⚠️ 重试预算耗尽，放弃该变体", ctx);
        AttemptOutcome::Abandoned {
            attempts: ctx.max_attempts,
            rejection_codes,
        }
    }

    /// 质量校验，通过后再查重
    fn check(
        &self,
        candidate: &CandidateQuestion,
        anchor: &Anchor,
        excerpt: &str,
        accepted: &[ValidatedQuestion],
    ) -> Result<(), RejectReason> {
        self.validator.validate(candidate, anchor, excerpt)?;
        if is_duplicate(candidate, accepted) {
            return Err(RejectReason::Duplicate);
        }
        Ok(())
    }

    fn transition(&self, ctx: &AttemptCtx, attempt: u32, state: &AttemptState) {
        debug!("{} 尝试 {}/{} -> {}", ctx, attempt, ctx.max_attempts, state);
    }
}
