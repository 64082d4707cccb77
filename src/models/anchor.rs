use serde::{Deserialize, Serialize};
use std::fmt;

/// 锚点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnchorType {
    Definition,
    Process,
    Risk,
    Boundary,
    Decision,
    Comparison,
}

impl AnchorType {
    pub const ALL: [AnchorType; 6] = [
        AnchorType::Definition,
        AnchorType::Process,
        AnchorType::Risk,
        AnchorType::Boundary,
        AnchorType::Decision,
        AnchorType::Comparison,
    ];

    /// 标准名称（与序列化结果一致）
    pub fn as_str(self) -> &'static str {
        match self {
            AnchorType::Definition => "DEFINITION",
            AnchorType::Process => "PROCESS",
            AnchorType::Risk => "RISK",
            AnchorType::Boundary => "BOUNDARY",
            AnchorType::Decision => "DECISION",
            AnchorType::Comparison => "COMPARISON",
        }
    }

    /// 锚点 ID 前缀
    pub fn code(self) -> &'static str {
        match self {
            AnchorType::Definition => "def",
            AnchorType::Process => "proc",
            AnchorType::Risk => "risk",
            AnchorType::Boundary => "bnd",
            AnchorType::Decision => "dec",
            AnchorType::Comparison => "cmp",
        }
    }

    /// Bloom 认知层级
    pub fn bloom_level(self) -> &'static str {
        match self {
            AnchorType::Definition => "remember",
            AnchorType::Comparison => "understand",
            AnchorType::Process => "apply",
            AnchorType::Boundary => "analyze",
            AnchorType::Risk | AnchorType::Decision => "evaluate",
        }
    }

    /// 每种类型支持的题干措辞变体，下标即 variant
    pub fn variant_names(self) -> &'static [&'static str] {
        match self {
            AnchorType::Definition => &["direct_definition", "term_identification"],
            AnchorType::Process => &["ordering", "missing_step"],
            AnchorType::Risk => &["consequence", "prevention"],
            AnchorType::Boundary => &["exception", "scope_limit"],
            AnchorType::Decision => &["scenario_choice", "trigger_condition"],
            AnchorType::Comparison => &["contrast", "distinguishing_feature"],
        }
    }

    /// variant 超出范围时循环取用
    pub fn variant_name(self, variant: u32) -> &'static str {
        let names = self.variant_names();
        names[variant as usize % names.len()]
    }
}

impl fmt::Display for AnchorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 锚点：字幕中一个已分类、带时间戳的教学要点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: String,
    #[serde(rename = "type")]
    pub anchor_type: AnchorType,
    pub concept_text: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub source_segment_index: usize,
}

impl Anchor {
    /// 锚点中心时间
    pub fn midpoint(&self) -> f64 {
        (self.start_seconds + self.end_seconds) / 2.0
    }
}
