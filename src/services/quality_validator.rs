//! 质量校验 - 业务能力层
//!
//! 纯函数，按顺序短路执行五项检查，第一项失败的检查决定拒绝原因：
//!
//! 1. 题干最低内容
//! 2. 题干完整性
//! 3. 锚点类型对齐（见 [`alignment_rules`](crate::services::alignment_rules)）
//! 4. 选项卫生
//! 5. 上下文依赖（防止脱离原文即可作答）
//!
//! 拒绝总是可恢复的，交给编排层决定是否重试。

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::models::anchor::{Anchor, AnchorType};
use crate::models::question::{CandidateQuestion, OptionKey};
use crate::models::version::RuleVersion;
use crate::services::alignment_rules::check_alignment;
use crate::utils::text::{content_words, tokenize};

/// 当前校验规则集版本
///
/// 修改任何检查的行为时必须提升，缓存中的旧结果会因此自动失效。
pub const CURRENT_RULE_VERSION: RuleVersion = RuleVersion::new(1, 4, 0);

pub const MIN_STEM_CHARS: usize = 20;
pub const MIN_OPTION_CHARS: usize = 10;
pub const MAX_OPTION_CHARS: usize = 200;

static VAGUE_REFERENTS: phf::Set<&'static str> = phf::phf_set! {
    "this", "provided", "aforementioned",
};

static DANGLING_CONJUNCTIONS: phf::Set<&'static str> = phf::phf_set! {
    "then", "if", "but", "and", "or", "so", "because", "when", "while", "although",
};

static RE_INCOMPLETE_PREDICATE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:will|would|can|could|should|must|may|might|does|do|did)\s+not\s+be|\b(?:is|are|was|were)\s+not|\bto|\bthe|\ban?|\bof)$").ok()
});

static RE_OPTION_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|[^A-Za-z0-9])[A-D]\.|^\s*\(?[A-D]\)\s").ok());

static RE_FILLER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:obviously|just|needless to say|clearly|of course|simply|basically)\b").ok()
});

/// 拒绝原因
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("题干过短 ({length} 字符)")]
    StemTooShort { length: usize },
    #[error("题干含模糊指代: {word}")]
    VagueReferent { word: String },
    #[error("题干不完整，结尾为: {ending}")]
    IncompleteStem { ending: String },
    #[error("题干与锚点类型 {anchor_type} 不符: {detail}")]
    TypeMisaligned { anchor_type: AnchorType, detail: String },
    #[error("选项 {key} 内嵌选项标签")]
    OptionLabelLeak { key: OptionKey },
    #[error("选项 {key} 含箭头序列")]
    OptionArrowSequence { key: OptionKey },
    #[error("选项 {key} 长度 {length} 不在 [10, 200] 内")]
    OptionLength { key: OptionKey, length: usize },
    #[error("选项 {key} 含填充词: {phrase}")]
    OptionFiller { key: OptionKey, phrase: String },
    #[error("选项 {first} 与 {second} 重复")]
    DuplicateOptions { first: OptionKey, second: OptionKey },
    #[error("题干与上下文重合的内容词不足 ({overlap}/{required})")]
    ContextIndependent { overlap: usize, required: usize },
    #[error("与已接受的题目重复")]
    Duplicate,
}

impl RejectReason {
    /// 审计元数据里使用的稳定代码
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::StemTooShort { .. } => "stem_too_short",
            RejectReason::VagueReferent { .. } => "vague_referent",
            RejectReason::IncompleteStem { .. } => "incomplete_stem",
            RejectReason::TypeMisaligned { .. } => "type_misaligned",
            RejectReason::OptionLabelLeak { .. } => "option_label_leak",
            RejectReason::OptionArrowSequence { .. } => "option_arrow_sequence",
            RejectReason::OptionLength { .. } => "option_length",
            RejectReason::OptionFiller { .. } => "option_filler",
            RejectReason::DuplicateOptions { .. } => "duplicate_options",
            RejectReason::ContextIndependent { .. } => "context_independent",
            RejectReason::Duplicate => "duplicate",
        }
    }
}

/// 质量校验器
#[derive(Debug, Clone, Default)]
pub struct QualityValidator;

impl QualityValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn rule_version(&self) -> RuleVersion {
        CURRENT_RULE_VERSION
    }

    /// 校验候选题
    pub fn validate(&self, candidate: &CandidateQuestion, anchor: &Anchor, context_excerpt: &str) -> Result<(), RejectReason> {
        check_stem_content(&candidate.stem)?;
        check_stem_completeness(&candidate.stem)?;
        check_type_alignment(anchor.anchor_type, &candidate.stem)?;
        check_option_hygiene(candidate)?;
        check_context_dependency(&candidate.stem, context_excerpt)?;
        Ok(())
    }
}

/// 使用默认校验器
pub fn validate(candidate: &CandidateQuestion, anchor: &Anchor, context_excerpt: &str) -> Result<(), RejectReason> {
    QualityValidator::new().validate(candidate, anchor, context_excerpt)
}

/// 检查 1：题干最低内容
pub fn check_stem_content(stem: &str) -> Result<(), RejectReason> {
    let length = stem.trim().chars().count();
    if length < MIN_STEM_CHARS {
        return Err(RejectReason::StemTooShort { length });
    }

    if let Some(word) = tokenize(stem)
        .into_iter()
        .find(|w| VAGUE_REFERENTS.contains(w.as_str()))
    {
        return Err(RejectReason::VagueReferent { word });
    }

    Ok(())
}

/// 检查 2：题干完整性
pub fn check_stem_completeness(stem: &str) -> Result<(), RejectReason> {
    let without_question_mark = stem.trim().trim_end_matches(|c: char| c == '?' || c.is_whitespace());
    if without_question_mark.ends_with("...") || without_question_mark.ends_with('…') {
        return Err(RejectReason::IncompleteStem {
            ending: "...".to_string(),
        });
    }

    let core = without_question_mark
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
    let last_word = core
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .to_lowercase();

    if DANGLING_CONJUNCTIONS.contains(last_word.as_str()) {
        return Err(RejectReason::IncompleteStem { ending: last_word });
    }

    if let Some(re) = RE_INCOMPLETE_PREDICATE.as_ref() {
        if let Some(m) = re.find(core) {
            return Err(RejectReason::IncompleteStem {
                ending: m.as_str().to_lowercase(),
            });
        }
    }

    Ok(())
}

/// 检查 3：锚点类型对齐
pub fn check_type_alignment(anchor_type: AnchorType, stem: &str) -> Result<(), RejectReason> {
    check_alignment(anchor_type, stem).map_err(|m| RejectReason::TypeMisaligned {
        anchor_type,
        detail: m.describe(),
    })
}

/// 检查 4：选项卫生
pub fn check_option_hygiene(candidate: &CandidateQuestion) -> Result<(), RejectReason> {
    for (key, text) in candidate.options.iter() {
        if has_nested_label(text) {
            return Err(RejectReason::OptionLabelLeak { key });
        }
        if has_arrow_sequence(text) {
            return Err(RejectReason::OptionArrowSequence { key });
        }

        let length = text.trim().chars().count();
        if !(MIN_OPTION_CHARS..=MAX_OPTION_CHARS).contains(&length) {
            return Err(RejectReason::OptionLength { key, length });
        }

        if let Some(m) = RE_FILLER.as_ref().and_then(|re| re.find(text)) {
            return Err(RejectReason::OptionFiller {
                key,
                phrase: m.as_str().to_lowercase(),
            });
        }
    }

    let options: Vec<(OptionKey, String)> = candidate
        .options
        .iter()
        .map(|(k, t)| (k, t.trim().to_lowercase()))
        .collect();
    for (i, (first, a)) in options.iter().enumerate() {
        if let Some((second, _)) = options[i + 1..].iter().find(|(_, b)| b == a) {
            return Err(RejectReason::DuplicateOptions {
                first: *first,
                second: *second,
            });
        }
    }

    Ok(())
}

/// 选项中是否嵌入了 A./B./C./D. 之类的标签
pub fn has_nested_label(option: &str) -> bool {
    RE_OPTION_LABEL
        .as_ref()
        .map(|re| re.is_match(option))
        .unwrap_or(false)
}

/// 选项是否是用箭头连接的序列
pub fn has_arrow_sequence(option: &str) -> bool {
    option.contains("->") || option.contains('→')
}

/// 检查 5：上下文依赖
///
/// 题干内容词超过 6 个时要求 3 个与原文重合，否则要求 2 个。
pub fn check_context_dependency(stem: &str, context_excerpt: &str) -> Result<(), RejectReason> {
    let stem_words = content_words(stem);
    let context = content_words(context_excerpt);

    let required = if stem_words.len() >= 7 { 3 } else { 2 };
    let overlap = stem_words.intersection(&context).count();

    if overlap < required {
        return Err(RejectReason::ContextIndependent { overlap, required });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionOptions;

    const EXCERPT: &str = "First, create an account. Then verify your email. Finally, log in.";

    fn process_anchor() -> Anchor {
        Anchor {
            id: "proc-001".to_string(),
            anchor_type: AnchorType::Process,
            concept_text: EXCERPT.to_string(),
            start_seconds: 10.0,
            end_seconds: 14.0,
            source_segment_index: 0,
        }
    }

    fn good_options() -> QuestionOptions {
        QuestionOptions::new(
            "Create an account, verify the email, then log in",
            "Log in, verify the email, then create an account",
            "Verify the email, log in, then create an account",
            "Create an account, log in, then verify the email",
        )
    }

    fn candidate(stem: &str, options: QuestionOptions) -> CandidateQuestion {
        CandidateQuestion {
            anchor_id: "proc-001".to_string(),
            anchor_type: AnchorType::Process,
            variant: 0,
            stem: stem.to_string(),
            options,
            correct_key: OptionKey::A,
        }
    }

    fn reject_code(stem: &str, options: QuestionOptions) -> Option<&'static str> {
        validate(&candidate(stem, options), &process_anchor(), EXCERPT)
            .err()
            .map(|r| r.code())
    }

    #[test]
    fn test_valid_process_question_passes() {
        let stem = "What is the correct order of steps to create an account, verify your email, and log in?";
        assert_eq!(reject_code(stem, good_options()), None);
    }

    #[test]
    fn test_definition_stem_rejected_for_process_anchor() {
        assert_eq!(
            reject_code("What is an account?", good_options()),
            Some("stem_too_short")
        );
        assert_eq!(
            reject_code("What is an account used for online?", good_options()),
            Some("type_misaligned")
        );
    }

    #[test]
    fn test_vague_referent_rejected() {
        let stem = "In this process, which step comes after creating an account?";
        assert_eq!(reject_code(stem, good_options()), Some("vague_referent"));
    }

    #[test]
    fn test_incomplete_stems_rejected() {
        for stem in [
            "Which step comes right after creating the account and",
            "Which step comes right after creating the account...",
            "After creating an account the next step will not be",
            "After creating an account the next step is not",
            "After creating an account the next step is to",
        ] {
            assert_eq!(reject_code(stem, good_options()), Some("incomplete_stem"), "{}", stem);
        }
    }

    #[test]
    fn test_check_order_short_circuits() {
        // 同时过短和不完整时，报告第一项
        assert_eq!(reject_code("What then?", good_options()), Some("stem_too_short"));
    }

    #[test]
    fn test_option_label_and_arrow_rejected() {
        let stem = "What is the correct order of steps to create an account, verify your email, and log in?";

        let mut options = good_options();
        options.b = "B. Log in before you verify the email".to_string();
        assert_eq!(reject_code(stem, options), Some("option_label_leak"));

        let mut options = good_options();
        options.c = "Verify email and also see option A.".to_string();
        assert_eq!(reject_code(stem, options), Some("option_label_leak"));

        let mut options = good_options();
        options.d = "Create account -> verify email -> log in".to_string();
        assert_eq!(reject_code(stem, options), Some("option_arrow_sequence"));

        let mut options = good_options();
        options.d = "Create account → log in".to_string();
        assert_eq!(reject_code(stem, options), Some("option_arrow_sequence"));
    }

    #[test]
    fn test_option_length_filler_and_duplicates() {
        let stem = "What is the correct order of steps to create an account, verify your email, and log in?";

        let mut options = good_options();
        options.a = "Log in".to_string();
        assert_eq!(reject_code(stem, options), Some("option_length"));

        let mut options = good_options();
        options.a = "x".repeat(201);
        assert_eq!(reject_code(stem, options), Some("option_length"));

        let mut options = good_options();
        options.c = "Obviously you log in before anything else".to_string();
        assert_eq!(reject_code(stem, options), Some("option_filler"));

        let mut options = good_options();
        options.d = options.a.to_uppercase();
        assert_eq!(reject_code(stem, options), Some("duplicate_options"));
    }

    #[test]
    fn test_context_independent_question_rejected() {
        let stem = "What is the correct order of steps when configuring a Kubernetes ingress controller?";
        assert_eq!(reject_code(stem, good_options()), Some("context_independent"));
    }

    #[test]
    fn test_nested_label_regex() {
        assert!(has_nested_label("A. first choice"));
        assert!(has_nested_label("see C.and more"));
        assert!(has_nested_label("(D) another"));
        assert!(!has_nested_label("A plain answer about email"));
        assert!(!has_nested_label("Use Docker containers"));
    }

    #[test]
    fn test_static_patterns_compile() {
        assert!(RE_INCOMPLETE_PREDICATE.is_some());
        assert!(RE_OPTION_LABEL.is_some());
        assert!(RE_FILLER.is_some());
    }

    #[test]
    fn test_rule_version_is_exposed() {
        assert_eq!(QualityValidator::new().rule_version(), CURRENT_RULE_VERSION);
    }
}
