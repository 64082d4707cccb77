//! 去重 - 业务能力层
//!
//! 先比较题干是否完全相同（忽略大小写），再比较词集合的 Jaccard 相似度。

use std::collections::HashSet;

use crate::models::question::{CandidateQuestion, ValidatedQuestion};
use crate::utils::text::word_set;

/// 超过该相似度即视为重复
pub const DUPLICATE_THRESHOLD: f64 = 0.8;

/// Jaccard 相似度：|交集| / |并集|
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// 两个题干是否重复
pub fn stems_are_duplicate(a: &str, b: &str) -> bool {
    if a.trim().to_lowercase() == b.trim().to_lowercase() {
        return true;
    }
    jaccard_similarity(&word_set(a), &word_set(b)) > DUPLICATE_THRESHOLD
}

/// 候选题是否与已接受的题目重复
///
/// 随每道题的接受增量执行，后面的锚点会和目前为止的全部结果比较。
pub fn is_duplicate(candidate: &CandidateQuestion, accepted: &[ValidatedQuestion]) -> bool {
    accepted
        .iter()
        .any(|q| stems_are_duplicate(&candidate.stem, &q.stem))
}
