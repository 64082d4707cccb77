//! 锚点类型对齐规则表
//!
//! 每种类型一条声明式规则，由同一个通用检查器执行。
//! 先看禁止句式（命中即拒绝，即使也含有本类型关键词），
//! 再看必需句式，最后看必需关键词。

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::models::anchor::AnchorType;
use crate::utils::text::tokenize;

/// 一条对齐规则
#[derive(Debug, Clone, Copy)]
pub struct AlignmentRule {
    pub anchor_type: AnchorType,
    /// 任一命中即可；为空表示不要求
    pub required_patterns: &'static [&'static str],
    /// 任一出现即可；为空表示不要求
    pub required_keywords: &'static [&'static str],
    /// 任一命中即拒绝
    pub forbidden_patterns: &'static [&'static str],
}

/// 定义式题干模板
pub const DEFINITION_TEMPLATES: &[&str] = &[
    r"\bwhat is the definition of\b",
    r"\bwhich (?:of the following )?(?:best )?describes\b",
    r"\brefers to\b",
    r"\bis defined as\b",
    r"\bwhat is meant by\b",
    r"^what (?:is|are) (?:a|an|the)\b[^?]*?\b(?:that|which) (?:stores?|holds?|contains?|is oriented|oriented)\b",
    r"^what (?:is|are) (?:an? |the )?[\w-]+(?: [\w-]+){0,2}\s*\?$",
];

/// 定义题不允许出现的流程 / 决策句式
pub const PROCESS_OR_DECISION_TEMPLATES: &[&str] = &[
    r"\b(?:correct |proper |right )?(?:order|sequence)\b",
    r"\bwhich step\b",
    r"\bmissing step\b",
    r"\bwhat (?:comes|happens|should happen) (?:first|next|after|before)\b",
    r"\bwhat should\b",
    r"\bwhich (?:option|action|approach|choice) should\b",
    r"\bin (?:this|the following|the described) scenario\b",
    r"^if\b",
];

pub const ALIGNMENT_RULES: &[AlignmentRule] = &[
    AlignmentRule {
        anchor_type: AnchorType::Definition,
        required_patterns: &[
            r"\bdefinition of\b",
            r"\bbest defines\b",
            r"\bwhich (?:of the following )?(?:best )?describes\b",
            r"\brefers to\b",
            r"\bis defined as\b",
            r"\bwhat is meant by\b",
            r"\bwhich term\b",
        ],
        required_keywords: &[],
        forbidden_patterns: PROCESS_OR_DECISION_TEMPLATES,
    },
    AlignmentRule {
        anchor_type: AnchorType::Process,
        required_patterns: &[],
        required_keywords: &[
            "order", "sequence", "step", "steps", "first", "next", "then", "finally", "before",
            "after",
        ],
        forbidden_patterns: DEFINITION_TEMPLATES,
    },
    AlignmentRule {
        anchor_type: AnchorType::Risk,
        required_patterns: &[],
        required_keywords: &[
            "risk", "risks", "danger", "dangers", "dangerous", "warning", "warn", "avoid",
            "prevent", "consequence", "consequences",
        ],
        forbidden_patterns: DEFINITION_TEMPLATES,
    },
    AlignmentRule {
        anchor_type: AnchorType::Boundary,
        required_patterns: &[],
        required_keywords: &[
            "not", "except", "excluding", "only", "solely", "exception", "excluded",
        ],
        forbidden_patterns: DEFINITION_TEMPLATES,
    },
    AlignmentRule {
        anchor_type: AnchorType::Decision,
        required_patterns: &[],
        required_keywords: &[
            "if", "when", "should", "would", "choose", "decide", "scenario",
        ],
        forbidden_patterns: DEFINITION_TEMPLATES,
    },
    AlignmentRule {
        anchor_type: AnchorType::Comparison,
        required_patterns: &[],
        required_keywords: &[
            "differ", "differs", "difference", "differences", "compared", "comparison", "versus",
            "unlike", "whereas", "contrast", "distinguish", "distinguishes",
        ],
        forbidden_patterns: DEFINITION_TEMPLATES,
    },
];

/// 编译后的规则
struct CompiledRule {
    rule: AlignmentRule,
    required_patterns: Vec<Regex>,
    forbidden_patterns: Vec<(Regex, &'static str)>,
}

static COMPILED_RULES: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| {
    ALIGNMENT_RULES
        .iter()
        .map(|rule| CompiledRule {
            rule: *rule,
            required_patterns: rule
                .required_patterns
                .iter()
                .filter_map(|p| compile(p))
                .collect(),
            forbidden_patterns: rule
                .forbidden_patterns
                .iter()
                .filter_map(|p| compile(p).map(|re| (re, *p)))
                .collect(),
        })
        .collect()
});

static COMPILED_DEFINITION_TEMPLATES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| DEFINITION_TEMPLATES.iter().filter_map(|p| compile(p)).collect());

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(&format!("(?i){}", pattern)).ok()
}

/// 对齐检查失败的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Misalignment {
    /// 命中了禁止句式
    ForbiddenTemplate(&'static str),
    /// 缺少必需句式
    MissingPattern,
    /// 缺少必需关键词
    MissingKeyword,
}

impl Misalignment {
    pub fn describe(&self) -> String {
        match self {
            Misalignment::ForbiddenTemplate(pattern) => format!("命中其他类型的句式: {}", pattern),
            Misalignment::MissingPattern => "缺少本类型要求的题干句式".to_string(),
            Misalignment::MissingKeyword => "缺少本类型要求的关键词".to_string(),
        }
    }
}

/// 通用对齐检查
pub fn check_alignment(anchor_type: AnchorType, stem: &str) -> Result<(), Misalignment> {
    let Some(compiled) = COMPILED_RULES
        .iter()
        .find(|c| c.rule.anchor_type == anchor_type)
    else {
        return Ok(());
    };

    let stem = stem.trim();

    if let Some((_, pattern)) = compiled
        .forbidden_patterns
        .iter()
        .find(|(re, _)| re.is_match(stem))
    {
        return Err(Misalignment::ForbiddenTemplate(*pattern));
    }

    if !compiled.required_patterns.is_empty()
        && !compiled.required_patterns.iter().any(|re| re.is_match(stem))
    {
        return Err(Misalignment::MissingPattern);
    }

    if !compiled.rule.required_keywords.is_empty() {
        let tokens: HashSet<String> = tokenize(stem).into_iter().collect();
        if !compiled
            .rule
            .required_keywords
            .iter()
            .any(|k| tokens.contains(*k))
        {
            return Err(Misalignment::MissingKeyword);
        }
    }

    Ok(())
}

/// 提示给出题模型的题干关键词
///
/// 关键词型规则直接取关键词；定义题只有句式要求，给出对应的短语。
pub fn required_stem_keywords(anchor_type: AnchorType) -> Vec<String> {
    match anchor_type {
        AnchorType::Definition => ["definition of", "describes", "refers to", "is defined as"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        other => ALIGNMENT_RULES
            .iter()
            .find(|r| r.anchor_type == other)
            .map(|r| r.required_keywords.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default(),
    }
}

/// 题干是否命中任一定义式模板
pub fn matches_definition_template(stem: &str) -> bool {
    COMPILED_DEFINITION_TEMPLATES
        .iter()
        .any(|re| re.is_match(stem.trim()))
}
