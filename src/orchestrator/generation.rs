//! 出题编排器
//!
//! 把检测、窗口、起草、校验、去重串起来，对一份字幕产出最终题目集合和生成元数据。
//! 不读写缓存，缓存与计数由 [`GenerationService`](super::generation_service::GenerationService) 负责。

use tracing::{debug, info, warn};

use crate::config::{GenerationConfig, ShortfallPolicy};
use crate::error::{AppResult, InputError};
use crate::models::anchor::Anchor;
use crate::models::question::ValidatedQuestion;
use crate::models::record::{
    compute_evidence_hash, AnchorRecord, GenerationStatus, GenerationSummary, SCHEMA_VERSION,
};
use crate::models::transcript::{validate_segments, video_duration, TranscriptSegment};
use crate::models::window::ContextWindow;
use crate::services::anchor_detector::AnchorDetector;
use crate::services::context_window;
use crate::services::llm_service::QuestionDrafter;
use crate::services::quality_validator::QualityValidator;
use crate::workflow::{AttemptCtx, AttemptOutcome, QuestionFlow};

/// 一次生成的结果
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub status: GenerationStatus,
    pub questions: Vec<ValidatedQuestion>,
    /// 锚点及审计元数据
    pub anchors: Vec<AnchorRecord>,
    pub summary: GenerationSummary,
    pub evidence_hash: String,
}

impl GenerationOutcome {
    pub fn is_shortfall(&self, target_count: usize) -> bool {
        self.questions.len() < target_count
    }
}

/// 出题编排器
pub struct Generator<'a, D: QuestionDrafter> {
    drafter: &'a D,
    detector: AnchorDetector,
    validator: QualityValidator,
}

impl<'a, D: QuestionDrafter> Generator<'a, D> {
    pub fn new(drafter: &'a D) -> Self {
        Self {
            drafter,
            detector: AnchorDetector::default(),
            validator: QualityValidator::new(),
        }
    }

    pub fn with_detector(mut self, detector: AnchorDetector) -> Self {
        self.detector = detector;
        self
    }

    pub async fn generate(&self, segments: &[TranscriptSegment], config: &GenerationConfig) -> AppResult<GenerationOutcome> {
        if segments.is_empty() {
            return Err(InputError::EmptyTranscript.into());
        }
        validate_segments(segments)?;

        let duration = video_duration(segments);
        if !duration.is_finite() || duration <= 0.0 {
            return Err(InputError::InvalidVideoDuration(duration).into());
        }

        let anchors = self.detector.detect(segments);
        if anchors.is_empty() {
            warn!("⚠️ 未检测到任何锚点，需要降级处理");
            return finish(GenerationStatus::InsufficientAnchors, Vec::new(), Vec::new(), 0);
        }
        info!("🔎 检测到 {} 个锚点，目标 {} 题", anchors.len(), config.target_count);

        let mut records: Vec<AnchorRecord> = anchors.into_iter().map(AnchorRecord::new).collect();
        let mut questions: Vec<ValidatedQuestion> = Vec::new();
        let mut abandoned = 0usize;

        let passes = match config.shortfall_policy {
            ShortfallPolicy::Partial => 1,
            ShortfallPolicy::SecondPass => 2,
        };

        'passes: for pass in 0..passes {
            if pass > 0 {
                info!(
                    "🔁 第一轮后 {}/{} 题，使用额外变体补扫",
                    questions.len(),
                    config.target_count
                );
            }
            let variants = pass * config.variants_per_anchor..(pass + 1) * config.variants_per_anchor;

            for record in records.iter_mut() {
                for variant in variants.clone() {
                    if questions.len() >= config.target_count {
                        break 'passes;
                    }

                    let window = match &record.context_window {
                        Some(window) => window.clone(),
                        None => {
                            let window = context_window::build(&record.anchor, duration, config.span_seconds)?;
                            record.context_window = Some(window.clone());
                            window
                        }
                    };
                    let excerpt = context_window::excerpt(segments, &window);

                    let outcome = self
                        .attempt(&record.anchor, variant, config, &window, &excerpt, &questions)
                        .await;

                    record.attempts += outcome.attempts() as usize;
                    record
                        .rejection_codes
                        .extend(outcome.rejection_codes().iter().cloned());
                    match outcome {
                        AttemptOutcome::Accepted { question, .. } => {
                            record.questions_accepted += 1;
                            questions.push(question);
                        }
                        AttemptOutcome::Abandoned { .. } => abandoned += 1,
                    }
                }
            }
        }

        let status = if questions.len() >= config.target_count {
            GenerationStatus::Success
        } else {
            warn!(
                "⚠️ 锚点已用尽，仅生成 {}/{} 题，按部分结果返回",
                questions.len(),
                config.target_count
            );
            GenerationStatus::Partial
        };

        finish(status, records, questions, abandoned)
    }

    async fn attempt(
        &self,
        anchor: &Anchor,
        variant: u32,
        config: &GenerationConfig,
        window: &ContextWindow,
        excerpt: &str,
        accepted: &[ValidatedQuestion],
    ) -> AttemptOutcome {
        let ctx = AttemptCtx::new(anchor, variant, config.max_attempts());
        debug!("{} 窗口 {:.1}s-{:.1}s", ctx, window.start_seconds, window.end_seconds);
        QuestionFlow::new(self.drafter, &self.validator)
            .run(&ctx, anchor, window, excerpt, accepted)
            .await
    }
}

/// 汇总并计算证据哈希
fn finish(
    status: GenerationStatus,
    anchors: Vec<AnchorRecord>,
    questions: Vec<ValidatedQuestion>,
    abandoned: usize,
) -> AppResult<GenerationOutcome> {
    let summary = GenerationSummary::from_parts(&anchors, &questions, abandoned);
    let evidence_hash = compute_evidence_hash(SCHEMA_VERSION, &anchors, &summary)?;
    Ok(GenerationOutcome {
        status,
        questions,
        anchors,
        summary,
        evidence_hash,
    })
}

/// 使用默认检测器与校验器生成
pub async fn generate<D: QuestionDrafter>(
    drafter: &D,
    segments: &[TranscriptSegment],
    config: &GenerationConfig,
) -> AppResult<GenerationOutcome> {
    Generator::new(drafter).generate(segments, config).await
}
