//! 锚点检测 - 业务能力层
//!
//! 纯函数：扫描字幕片段，按触发词族识别教学要点，估算句级时间戳，
//! 清洗概念文本，丢弃不完整的锚点。无外部调用，结果确定。

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::models::anchor::{Anchor, AnchorType};
use crate::models::transcript::TranscriptSegment;
use crate::services::deduplicator::jaccard_similarity;
use crate::utils::text::{ends_with_terminal_punctuation, word_count, word_set};

/// 触发词族
///
/// 按优先级排列，一个句子只归入第一个命中的类型。
const TRIGGER_TABLE: &[(AnchorType, &[&str])] = &[
    (
        AnchorType::Definition,
        &[
            r"\bis defined as\b",
            r"\bare defined as\b",
            r"\brefers? to\b",
            r"\b(is|are) known as\b",
            r"\b(is|are) called\b",
            r"\bdefinition of\b",
            r"\bthe term\b",
        ],
    ),
    (
        AnchorType::Comparison,
        &[
            r"\bversus\b",
            r"\bvs\.?\s",
            r"\bcompared (to|with)\b",
            r"\bunlike\b",
            r"\bwhereas\b",
            r"\bin contrast\b",
            r"\bdiffers? from\b",
            r"\bdifference between\b",
        ],
    ),
    (
        AnchorType::Process,
        &[
            r"^(first|firstly|second|secondly|third|next|then|finally|lastly|afterwards)\b",
            r"\bsteps?\b",
            r"\bafter that\b",
        ],
    ),
    (
        AnchorType::Risk,
        &[
            r"\brisks?\b",
            r"\brisky\b",
            r"\bdanger(ous)?\b",
            r"\bwarning\b",
            r"\bavoid\b",
            r"\bconsequences?\b",
            r"\bcareful\b",
        ],
    ),
    (
        AnchorType::Boundary,
        &[
            r"\bexcept\b",
            r"\bexcluding\b",
            r"\bonly\b",
            r"\bsolely\b",
            r"\bunless\b",
            r"\bdoes not apply\b",
        ],
    ),
    (
        AnchorType::Decision,
        &[
            r"\bif\b",
            r"\bwhen\b",
            r"\bshould\b",
            r"\bscenario\b",
            r"\bdecide\b",
            r"\bchoose\b",
        ],
    ),
];

static COMPILED_TRIGGERS: LazyLock<Vec<(AnchorType, Vec<Regex>)>> = LazyLock::new(|| {
    TRIGGER_TABLE
        .iter()
        .map(|(anchor_type, patterns)| {
            let compiled = patterns
                .iter()
                .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
                .collect();
            (*anchor_type, compiled)
        })
        .collect()
});

static RE_SENTENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"[^.!?]+(?:[.!?]+["'”’)\]]*|$)"#).ok());

static RE_FILLER_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:so|and|but|well|okay|ok|now|basically|remember|also|alright|right|um|uh)\b,?\s+)+").ok()
});

static RE_VAGUE_PHRASE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i),?\s*\b(?:as\s+)?(?:provided|mentioned|shown|described|discussed)\s+(?:above|earlier|before|previously|here)\b,?").ok()
});

static RE_AFOREMENTIONED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:the\s+)?aforementioned\b").ok());

static RE_LEADING_DEMONSTRATIVE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^(this|that|these|those)\s+([a-z']+)").ok());

/// 指示代词后紧跟这些词时是代词用法
static PRONOUN_FOLLOWERS: phf::Set<&'static str> = phf::phf_set! {
    "is", "are", "was", "were", "means", "will", "would", "can", "could", "should",
    "has", "have", "does", "do", "may", "might", "must", "shows", "tells",
};

/// 锚点检测器
#[derive(Debug, Clone)]
pub struct AnchorDetector {
    /// 同类型近似概念在该时间内视为重复（秒）
    pub merge_window_seconds: f64,
    /// 近似重复判定阈值
    pub merge_similarity: f64,
    /// 概念文本最大长度（字符）
    pub max_concept_chars: usize,
    /// 概念文本最少单词数
    pub min_concept_words: usize,
}

impl Default for AnchorDetector {
    fn default() -> Self {
        Self {
            merge_window_seconds: 15.0,
            merge_similarity: 0.8,
            max_concept_chars: 280,
            min_concept_words: 5,
        }
    }
}

/// 一个句子及其在片段中的单词位置
struct Sentence<'a> {
    text: &'a str,
    word_start: usize,
    word_end: usize,
}

/// 检测过程中的中间结果
struct RawAnchor {
    anchor_type: AnchorType,
    text: String,
    start_seconds: f64,
    end_seconds: f64,
    segment_index: usize,
}

impl AnchorDetector {
    /// 从字幕片段中检测锚点
    ///
    /// 空输入或无命中时返回空列表，由调用方决定是否降级。
    pub fn detect(&self, segments: &[TranscriptSegment]) -> Vec<Anchor> {
        let mut kept: Vec<RawAnchor> = Vec::new();
        let mut discarded = 0usize;

        for (segment_index, segment) in segments.iter().enumerate() {
            for raw in self.scan_segment(segment_index, segment) {
                let Some(concept) = self.sanitize(&raw.text) else {
                    discarded += 1;
                    debug!("丢弃不完整锚点: {}", raw.text);
                    continue;
                };

                if self.is_near_duplicate(&kept, raw.anchor_type, &concept, raw.start_seconds) {
                    debug!("合并重复锚点: {}", concept);
                    continue;
                }

                kept.push(RawAnchor { text: concept, ..raw });
            }
        }

        let anchors: Vec<Anchor> = kept
            .into_iter()
            .enumerate()
            .map(|(i, raw)| Anchor {
                id: format!("{}-{:03}", raw.anchor_type.code(), i + 1),
                anchor_type: raw.anchor_type,
                concept_text: raw.text,
                start_seconds: raw.start_seconds,
                end_seconds: raw.end_seconds,
                source_segment_index: raw.segment_index,
            })
            .collect();

        debug!(
            "锚点检测完成: 保留 {} 个, 丢弃 {} 个",
            anchors.len(),
            discarded
        );
        anchors
    }

    /// 扫描单个片段；同一片段内连续的 PROCESS 句合并成一个锚点
    fn scan_segment(&self, segment_index: usize, segment: &TranscriptSegment) -> Vec<RawAnchor> {
        let sentences = split_sentences(&segment.text);
        let total_words = word_count(&segment.text).max(1);
        let interpolate = |word_pos: usize| {
            let ratio = word_pos as f64 / total_words as f64;
            segment.start_seconds + ratio.clamp(0.0, 1.0) * segment.duration()
        };

        let mut found: Vec<RawAnchor> = Vec::new();
        let mut previous_type: Option<AnchorType> = None;

        for sentence in sentences {
            let Some(anchor_type) = classify_sentence(sentence.text) else {
                previous_type = None;
                continue;
            };

            let extends_process = anchor_type == AnchorType::Process
                && previous_type == Some(AnchorType::Process);

            previous_type = Some(anchor_type);

            if extends_process {
                if let Some(last) = found.last_mut() {
                    last.text.push(' ');
                    last.text.push_str(sentence.text);
                    last.end_seconds = interpolate(sentence.word_end);
                    continue;
                }
            }

            found.push(RawAnchor {
                anchor_type,
                text: sentence.text.to_string(),
                start_seconds: interpolate(sentence.word_start),
                end_seconds: interpolate(sentence.word_end),
                segment_index,
            });
        }

        found
    }

    /// 清洗概念文本；不满足完整性要求时返回 None
    ///
    /// 句首 this/that 作限定词时改写为 The，作代词时丢弃该锚点
    pub fn sanitize(&self, text: &str) -> Option<String> {
        let mut concept = text.split_whitespace().collect::<Vec<_>>().join(" ");

        if let Some(re) = RE_FILLER_PREFIX.as_ref() {
            concept = re.replace(&concept, "").into_owned();
        }
        if let Some(re) = RE_VAGUE_PHRASE.as_ref() {
            concept = re.replace_all(&concept, "").into_owned();
        }
        if let Some(re) = RE_AFOREMENTIONED.as_ref() {
            concept = re.replace_all(&concept, "the").into_owned();
        }
        if let Some(re) = RE_LEADING_DEMONSTRATIVE.as_ref() {
            if let Some(is_determiner) = re.captures(&concept).map(|c| is_determiner_use(&c[1], &c[2])) {
                // 代词用法指向上文，脱离上下文无法独立成题
                if !is_determiner {
                    return None;
                }
                concept = re.replace(&concept, "The $2").into_owned();
            }
        }
        let mut concept = concept.split_whitespace().collect::<Vec<_>>().join(" ");

        if concept.chars().count() > self.max_concept_chars {
            let capped: String = concept.chars().take(self.max_concept_chars).collect();
            let cut = capped.rfind(['.', '!', '?'])?;
            concept = capped[..=cut].trim().to_string();
        }

        concept = capitalize_first(&concept);

        if !ends_with_terminal_punctuation(&concept) || word_count(&concept) < self.min_concept_words {
            return None;
        }

        Some(concept)
    }

    fn is_near_duplicate(&self, kept: &[RawAnchor], anchor_type: AnchorType, concept: &str, start_seconds: f64) -> bool {
        let words = word_set(concept);
        kept.iter().rev().any(|prev| {
            prev.anchor_type == anchor_type
                && (start_seconds - prev.start_seconds).abs() <= self.merge_window_seconds
                && jaccard_similarity(&word_set(&prev.text), &words) > self.merge_similarity
        })
    }
}

/// 使用默认参数检测锚点
pub fn detect(segments: &[TranscriptSegment]) -> Vec<Anchor> {
    AnchorDetector::default().detect(segments)
}

/// 句子分类：返回第一个命中的锚点类型
pub fn classify_sentence(sentence: &str) -> Option<AnchorType> {
    let trimmed = sentence.trim();
    COMPILED_TRIGGERS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(trimmed)))
        .map(|(anchor_type, _)| *anchor_type)
}

fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    let Some(re) = RE_SENTENCE.as_ref() else {
        return Vec::new();
    };

    re.find_iter(text)
        .filter_map(|m| {
            let sentence = m.as_str().trim();
            if sentence.is_empty() {
                return None;
            }
            let word_start = word_count(&text[..m.start()]);
            Some(Sentence {
                text: sentence,
                word_start,
                word_end: word_start + word_count(sentence),
            })
        })
        .collect()
}

/// 句首 this/that 等是限定词（后接名词）还是代词（后接动词）
fn is_determiner_use(demonstrative: &str, next_word: &str) -> bool {
    let next = next_word.to_lowercase();
    if PRONOUN_FOLLOWERS.contains(next.as_str()) {
        return false;
    }
    let singular = matches!(demonstrative.to_lowercase().as_str(), "this" | "that");
    // "This applies..." 之类：单数指示词后跟第三人称动词
    !(singular && next.ends_with('s') && !next.ends_with("ss"))
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
