use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::anchor::{Anchor, AnchorType};
use crate::models::question::ValidatedQuestion;
use crate::models::version::RuleVersion;
use crate::models::window::ContextWindow;

/// 持久化记录的结构版本
pub const SCHEMA_VERSION: u32 = 3;

/// 生成模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// 主模式：考试级
    ExamGrade,
    /// 降级模式：锚点不足时由调用方选择
    Degraded,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMode::ExamGrade => "exam_grade",
            GenerationMode::Degraded => "degraded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "exam_grade" | "exam" => Some(GenerationMode::ExamGrade),
            "degraded" => Some(GenerationMode::Degraded),
            _ => None,
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次生成的结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// 达到目标题数
    Success,
    /// 题数不足，如实报告
    Partial,
    /// 未检测到锚点，调用方应转入降级模式
    InsufficientAnchors,
}

impl GenerationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationStatus::Success => "success",
            GenerationStatus::Partial => "partial",
            GenerationStatus::InsufficientAnchors => "insufficient_anchors",
        }
    }
}

/// 锚点 + 教学元数据（审计轨迹）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    #[serde(flatten)]
    pub anchor: Anchor,
    /// 编排未走到该锚点时为空
    pub context_window: Option<ContextWindow>,
    pub bloom_level: String,
    pub questions_accepted: usize,
    pub attempts: usize,
    pub rejection_codes: Vec<String>,
}

impl AnchorRecord {
    pub fn new(anchor: Anchor) -> Self {
        let bloom_level = anchor.anchor_type.bloom_level().to_string();
        Self {
            anchor,
            context_window: None,
            bloom_level,
            questions_accepted: 0,
            attempts: 0,
            rejection_codes: Vec::new(),
        }
    }
}

/// 生成摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub total_anchors: usize,
    pub total_questions: usize,
    /// 各类型锚点数
    pub anchor_distribution: BTreeMap<AnchorType, usize>,
    /// 各类型入选题数
    pub question_distribution: BTreeMap<AnchorType, usize>,
    /// 耗尽重试预算被放弃的 (锚点, 变体) 数
    pub abandoned_variants: usize,
    /// 拒绝原因计数
    pub rejection_counts: BTreeMap<String, usize>,
}

impl GenerationSummary {
    pub fn from_parts(anchors: &[AnchorRecord], questions: &[ValidatedQuestion], abandoned_variants: usize) -> Self {
        let mut summary = GenerationSummary {
            total_anchors: anchors.len(),
            total_questions: questions.len(),
            abandoned_variants,
            ..Default::default()
        };

        for record in anchors {
            *summary
                .anchor_distribution
                .entry(record.anchor.anchor_type)
                .or_default() += 1;
            for code in &record.rejection_codes {
                *summary.rejection_counts.entry(code.clone()).or_default() += 1;
            }
        }
        for question in questions {
            *summary
                .question_distribution
                .entry(question.anchor_type)
                .or_default() += 1;
        }

        summary
    }
}

/// 质量指标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub anchors: Vec<AnchorRecord>,
    pub generation_summary: GenerationSummary,
    pub evidence_hash: String,
}

/// 持久化的生成记录
///
/// 只有编排层会写它；缓存层把它当作不透明整体读写。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub fingerprint: String,
    pub generation_mode: GenerationMode,
    pub validation_rule_version: RuleVersion,
    pub schema_version: u32,
    pub generation_count: u64,
    pub status: GenerationStatus,
    pub target_count: usize,
    pub quality_metrics: QualityMetrics,
    pub questions: Vec<ValidatedQuestion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationRecord {
    /// 重新计算证据哈希并与存储值比较
    pub fn verify_evidence(&self) -> bool {
        match compute_evidence_hash(
            self.schema_version,
            &self.quality_metrics.anchors,
            &self.quality_metrics.generation_summary,
        ) {
            Ok(hash) => hash == self.quality_metrics.evidence_hash,
            Err(_) => false,
        }
    }
}

#[derive(Serialize)]
struct EvidenceInput<'a> {
    schema_version: u32,
    anchors: &'a [AnchorRecord],
    generation_summary: &'a GenerationSummary,
}

/// 证据哈希：blake3(schema_version, anchors, generation_summary)
///
/// 哈希本身不参与输入。
pub fn compute_evidence_hash(
    schema_version: u32,
    anchors: &[AnchorRecord],
    generation_summary: &GenerationSummary,
) -> Result<String, serde_json::Error> {
    let serialized = serde_json::to_string(&EvidenceInput {
        schema_version,
        anchors,
        generation_summary,
    })?;
    Ok(blake3::hash(serialized.as_bytes()).to_hex().to_string())
}
