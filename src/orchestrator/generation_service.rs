//! 缓存感知的出题服务
//!
//! 生成记录的唯一写入方：
//! - 同一指纹同一时间最多一个生成任务（按指纹加锁，不同指纹互不阻塞）
//! - 命中缓存要求目标题数与本次请求一致且证据哈希校验通过，直接返回，不改动 `generation_count`
//! - 未命中时在超时保护下重新生成，整条记录一次写入；超时则什么都不写

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::GenerationConfig;
use crate::error::{AppError, AppResult};
use crate::infrastructure::cache_store::CacheStore;
use crate::models::record::{
    GenerationMode, GenerationRecord, GenerationStatus, QualityMetrics, SCHEMA_VERSION,
};
use crate::models::transcript::TranscriptSegment;
use crate::models::version::RuleVersion;
use crate::orchestrator::generation::{GenerationOutcome, Generator};
use crate::services::anchor_detector::AnchorDetector;
use crate::services::llm_service::QuestionDrafter;
use crate::services::quality_validator::CURRENT_RULE_VERSION;

/// 一次请求的结果来源
#[derive(Debug, Clone, PartialEq)]
pub enum Served {
    /// 缓存命中
    CacheHit(GenerationRecord),
    /// 重新生成；一道题都没有时不落库
    Generated {
        record: GenerationRecord,
        persisted: bool,
    },
    /// 未检测到锚点，调用方应降级，不落库
    InsufficientAnchors,
}

impl Served {
    pub fn record(&self) -> Option<&GenerationRecord> {
        match self {
            Served::CacheHit(record) | Served::Generated { record, .. } => Some(record),
            Served::InsufficientAnchors => None,
        }
    }

    pub fn into_record(self) -> Option<GenerationRecord> {
        match self {
            Served::CacheHit(record) | Served::Generated { record, .. } => Some(record),
            Served::InsufficientAnchors => None,
        }
    }

    pub fn is_cache_hit(&self) -> bool {
        matches!(self, Served::CacheHit(_))
    }
}

/// 出题服务
pub struct GenerationService<D: QuestionDrafter, S: CacheStore> {
    drafter: D,
    store: S,
    detector: AnchorDetector,
    rule_version: RuleVersion,
    timeout: Duration,
    claims: DashMap<String, Arc<Mutex<()>>>,
}

impl<D: QuestionDrafter, S: CacheStore> GenerationService<D, S> {
    pub fn new(drafter: D, store: S, timeout: Duration) -> Self {
        Self {
            drafter,
            store,
            detector: AnchorDetector::default(),
            rule_version: CURRENT_RULE_VERSION,
            timeout,
            claims: DashMap::new(),
        }
    }

    /// 覆盖当前规则版本（规则升级演练与测试）
    pub fn with_rule_version(mut self, rule_version: RuleVersion) -> Self {
        self.rule_version = rule_version;
        self
    }

    pub fn with_detector(mut self, detector: AnchorDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn rule_version(&self) -> RuleVersion {
        self.rule_version
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// 读缓存，未命中时生成
    pub async fn get_or_generate(
        &self,
        fingerprint: &str,
        segments: &[TranscriptSegment],
        config: &GenerationConfig,
    ) -> AppResult<Served> {
        self.serve(fingerprint, segments, config, false).await
    }

    /// 跳过缓存，强制完整重新生成
    pub async fn force_regenerate(
        &self,
        fingerprint: &str,
        segments: &[TranscriptSegment],
        config: &GenerationConfig,
    ) -> AppResult<Served> {
        self.serve(fingerprint, segments, config, true).await
    }

    async fn serve(
        &self,
        fingerprint: &str,
        segments: &[TranscriptSegment],
        config: &GenerationConfig,
        force: bool,
    ) -> AppResult<Served> {
        let claim = self.claim(fingerprint);
        let result = {
            let _guard = claim.lock().await;
            self.serve_claimed(fingerprint, segments, config, force).await
        };
        drop(claim);
        self.claims
            .remove_if(fingerprint, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// 取得指纹对应的锁；DashMap 的引用不跨越 await
    fn claim(&self, fingerprint: &str) -> Arc<Mutex<()>> {
        self.claims
            .entry(fingerprint.to_string())
            .or_default()
            .value()
            .clone()
    }

    async fn serve_claimed(
        &self,
        fingerprint: &str,
        segments: &[TranscriptSegment],
        config: &GenerationConfig,
        force: bool,
    ) -> AppResult<Served> {
        if !force {
            if let Some(record) = self
                .store
                .get(fingerprint, config.mode, self.rule_version)
                .await?
            {
                if record.target_count != config.target_count {
                    info!(
                        "🎯 缓存记录目标题数 {} 与本次请求 {} 不同，重新生成: {}",
                        record.target_count, config.target_count, fingerprint
                    );
                } else if record.verify_evidence() {
                    info!(
                        "💾 缓存命中: {} ({} 题, 第 {} 代)",
                        fingerprint,
                        record.questions.len(),
                        record.generation_count
                    );
                    return Ok(Served::CacheHit(record));
                } else {
                    warn!("⚠️ 缓存记录证据哈希不符，视为被篡改，重新生成: {}", fingerprint);
                }
            }
        }

        let generator = Generator::new(&self.drafter).with_detector(self.detector.clone());
        let outcome = tokio::time::timeout(self.timeout, generator.generate(segments, config))
            .await
            .map_err(|_| {
                warn!("⏱️ 生成超时，已放弃且不写入任何记录: {}", fingerprint);
                AppError::Cancelled {
                    fingerprint: fingerprint.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
            })??;

        if outcome.status == GenerationStatus::InsufficientAnchors {
            return Ok(Served::InsufficientAnchors);
        }

        let previous = self.store.peek(fingerprint, config.mode).await?;
        let record = self.build_record(fingerprint, config, outcome, previous.as_ref());

        if record.questions.is_empty() {
            warn!("⚠️ 未生成任何题目，不写入缓存: {}", fingerprint);
            return Ok(Served::Generated {
                record,
                persisted: false,
            });
        }

        self.store.put(fingerprint, &record).await?;
        info!(
            "✓ 已生成并写入缓存: {} ({}/{} 题, 第 {} 代)",
            fingerprint,
            record.questions.len(),
            record.target_count,
            record.generation_count
        );
        Ok(Served::Generated {
            record,
            persisted: true,
        })
    }

    /// 组装记录：只有考试级模式的完整重新生成才让 `generation_count` 加一
    fn build_record(
        &self,
        fingerprint: &str,
        config: &GenerationConfig,
        outcome: GenerationOutcome,
        previous: Option<&GenerationRecord>,
    ) -> GenerationRecord {
        let now = Utc::now();
        let previous_count = previous.map(|r| r.generation_count).unwrap_or(0);
        let generation_count = match config.mode {
            GenerationMode::ExamGrade => previous_count + 1,
            GenerationMode::Degraded => previous_count,
        };

        GenerationRecord {
            fingerprint: fingerprint.to_string(),
            generation_mode: config.mode,
            validation_rule_version: self.rule_version,
            schema_version: SCHEMA_VERSION,
            generation_count,
            status: outcome.status,
            target_count: config.target_count,
            quality_metrics: QualityMetrics {
                anchors: outcome.anchors,
                generation_summary: outcome.summary,
                evidence_hash: outcome.evidence_hash,
            },
            questions: outcome.questions,
            created_at: previous.map(|r| r.created_at).unwrap_or(now),
            updated_at: now,
        }
    }
}
