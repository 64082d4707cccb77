//! 文本工具
//!
//! 分词、停用词与内容词提取，供锚点检测、质量校验和去重共用。

use std::collections::{BTreeSet, HashSet};

/// 英文停用词，外加题干里常见但不携带内容的词
static STOPWORDS: phf::Set<&'static str> = phf::phf_set! {
    "a", "an", "the", "and", "or", "but", "if", "then", "so", "of", "to", "in", "on",
    "at", "by", "for", "with", "from", "into", "onto", "about", "as", "is", "are", "was",
    "were", "be", "been", "being", "am", "do", "does", "did", "done", "have", "has",
    "had", "it", "its", "they", "them", "their", "there", "these", "those", "this",
    "that", "you", "your", "we", "our", "he", "she", "his", "her", "i", "me", "my",
    "what", "which", "who", "whom", "whose", "why", "how", "where", "when", "while",
    "can", "could", "will", "would", "shall", "should", "may", "might", "must", "not",
    "no", "yes", "all", "any", "each", "every", "some", "such", "than", "too", "very",
    "also", "only", "own", "same", "other", "more", "most", "one", "two", "both",
    "following", "correct", "best", "statement", "statements", "describes", "describe",
    "according", "true", "false", "option", "options", "answer", "question", "speaker",
    "video", "lecture", "mentioned", "based", "likely", "first", "next", "finally",
};

/// 小写分词
///
/// 以字母数字和撇号之外的字符切分；`n't` 结尾的缩写额外产出 `not`。
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’')) {
        let token = raw
            .trim_matches(|c| c == '\'' || c == '’')
            .replace('’', "'")
            .to_lowercase();
        if token.is_empty() {
            continue;
        }
        let negated = token.ends_with("n't");
        tokens.push(token);
        if negated {
            tokens.push("not".to_string());
        }
    }
    tokens
}

/// 词集合（去重用）
pub fn word_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(word)
}

/// 简单的复数归一
pub fn normalize_word(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

/// 内容词：去掉停用词与过短的词，并做复数归一
pub fn content_words(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|w| w.chars().count() >= 3 && !is_stopword(w))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .map(|w| normalize_word(&w))
        .collect()
}

/// 单词个数（按空白切分）
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// 是否以句末标点结尾（允许收尾引号或括号）
pub fn ends_with_terminal_punctuation(text: &str) -> bool {
    let trimmed = text
        .trim_end()
        .trim_end_matches(['"', '\'', '”', '’', ')']);
    matches!(trimmed.chars().last(), Some('.') | Some('!') | Some('?'))
}
