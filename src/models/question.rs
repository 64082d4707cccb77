use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::anchor::AnchorType;
use crate::models::window::ContextWindow;

/// 选项标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptionKey {
    A,
    B,
    C,
    D,
}

impl OptionKey {
    pub const ALL: [OptionKey; 4] = [OptionKey::A, OptionKey::B, OptionKey::C, OptionKey::D];

    pub fn as_str(self) -> &'static str {
        match self {
            OptionKey::A => "A",
            OptionKey::B => "B",
            OptionKey::C => "C",
            OptionKey::D => "D",
        }
    }

    /// 宽松解析：接受 "b"、"B."、"(C)"、"Option D" 之类的写法
    pub fn parse(value: &str) -> Option<Self> {
        let cleaned: String = value
            .trim()
            .trim_start_matches("Option")
            .trim_start_matches("option")
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        match cleaned.to_ascii_uppercase().as_str() {
            "A" => Some(OptionKey::A),
            "B" => Some(OptionKey::B),
            "C" => Some(OptionKey::C),
            "D" => Some(OptionKey::D),
            _ => None,
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 四个选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOptions {
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
    #[serde(rename = "C")]
    pub c: String,
    #[serde(rename = "D")]
    pub d: String,
}

impl QuestionOptions {
    pub fn new(
        a: impl Into<String>,
        b: impl Into<String>,
        c: impl Into<String>,
        d: impl Into<String>,
    ) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            c: c.into(),
            d: d.into(),
        }
    }

    pub fn get(&self, key: OptionKey) -> &str {
        match key {
            OptionKey::A => &self.a,
            OptionKey::B => &self.b,
            OptionKey::C => &self.c,
            OptionKey::D => &self.d,
        }
    }

    /// 按 A-D 顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (OptionKey, &str)> {
        OptionKey::ALL.into_iter().map(move |key| (key, self.get(key)))
    }
}

/// 候选题：由草稿适配器产出，尚未可信
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuestion {
    pub anchor_id: String,
    pub anchor_type: AnchorType,
    pub variant: u32,
    pub stem: String,
    pub options: QuestionOptions,
    pub correct_key: OptionKey,
}

/// 已通过全部校验与去重的题目，进入结果集后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedQuestion {
    pub anchor_id: String,
    pub anchor_type: AnchorType,
    pub variant: u32,
    pub stem: String,
    pub options: QuestionOptions,
    pub correct_key: OptionKey,
    pub timestamp_seconds: f64,
    pub timestamp_mmss: String,
    pub context_window: ContextWindow,
}

impl ValidatedQuestion {
    /// 从候选题构造；时间戳取锚点开始时间
    pub fn accept(candidate: CandidateQuestion, timestamp_seconds: f64, context_window: ContextWindow) -> Self {
        Self {
            anchor_id: candidate.anchor_id,
            anchor_type: candidate.anchor_type,
            variant: candidate.variant,
            stem: candidate.stem,
            options: candidate.options,
            correct_key: candidate.correct_key,
            timestamp_seconds,
            timestamp_mmss: format_mmss(timestamp_seconds),
            context_window,
        }
    }
}

/// 秒数格式化为 mm:ss（分钟不封顶）
pub fn format_mmss(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}
