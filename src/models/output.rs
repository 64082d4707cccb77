use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::anchor::AnchorType;
use crate::models::question::{OptionKey, QuestionOptions};
use crate::models::record::{GenerationMode, GenerationRecord};

/// 对下游的输出状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    Success,
    Partial,
}

/// 锚点统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorStatistics {
    pub total_anchors: usize,
    pub anchor_distribution: BTreeMap<AnchorType, usize>,
}

/// 下游看到的单道题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputQuestion {
    pub question: String,
    pub options: QuestionOptions,
    pub anchor_type: AnchorType,
    pub timestamp_seconds: f64,
    pub timestamp_mmss: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<OptionKey>,
}

/// 输出契约
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOutput {
    pub status: OutputStatus,
    pub count: usize,
    pub mode: GenerationMode,
    pub anchor_statistics: AnchorStatistics,
    pub questions: Vec<OutputQuestion>,
}

impl QuizOutput {
    /// 由生成记录构造输出
    ///
    /// 默认不附带正确答案（防查答案策略在边界处执行）。
    pub fn from_record(record: &GenerationRecord, include_answers: bool) -> Self {
        let count = record.questions.len();
        let status = if count >= record.target_count {
            OutputStatus::Success
        } else {
            OutputStatus::Partial
        };

        let summary = &record.quality_metrics.generation_summary;
        let questions = record
            .questions
            .iter()
            .map(|q| OutputQuestion {
                question: q.stem.clone(),
                options: q.options.clone(),
                anchor_type: q.anchor_type,
                timestamp_seconds: q.timestamp_seconds,
                timestamp_mmss: q.timestamp_mmss.clone(),
                correct_answer: include_answers.then_some(q.correct_key),
            })
            .collect();

        Self {
            status,
            count,
            mode: record.generation_mode,
            anchor_statistics: AnchorStatistics {
                total_anchors: summary.total_anchors,
                anchor_distribution: summary.anchor_distribution.clone(),
            },
            questions,
        }
    }
}
