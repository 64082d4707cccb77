//! 内容指纹：缓存键的一部分

use serde::Serialize;

use crate::models::transcript::TranscriptSegment;

/// 来源 URL 的指纹
///
/// 忽略首尾空白、大小写与末尾的 `/`。
pub fn fingerprint_source(url: &str) -> String {
    let normalized = url.trim().trim_end_matches('/').to_lowercase();
    blake3::hash(normalized.as_bytes()).to_hex().to_string()
}

/// 规范化的片段：文本去掉首尾空白，字段顺序固定
#[derive(Serialize)]
struct CanonicalSegment<'a> {
    text: &'a str,
    start_seconds: f64,
    end_seconds: f64,
}

/// 没有来源 URL 时，用字幕内容计算指纹
///
/// 对规范化片段数组的 JSON 做 blake3。
pub fn fingerprint_segments(segments: &[TranscriptSegment]) -> Result<String, serde_json::Error> {
    let canonical: Vec<CanonicalSegment<'_>> = segments
        .iter()
        .map(|segment| CanonicalSegment {
            text: segment.text.trim(),
            start_seconds: segment.start_seconds,
            end_seconds: segment.end_seconds,
        })
        .collect();
    let json = serde_json::to_vec(&canonical)?;
    Ok(blake3::hash(&json).to_hex().to_string())
}
