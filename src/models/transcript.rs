use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// 字幕片段
///
/// 由外部转写服务产出，按开始时间排序，不可变，是流水线唯一的输入。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    #[serde(alias = "start")]
    pub start_seconds: f64,
    #[serde(alias = "end")]
    pub end_seconds: f64,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, start_seconds: f64, end_seconds: f64) -> Self {
        Self {
            text: text.into(),
            start_seconds,
            end_seconds,
        }
    }

    /// 片段时长（秒）
    pub fn duration(&self) -> f64 {
        (self.end_seconds - self.start_seconds).max(0.0)
    }
}

/// 校验字幕片段
///
/// 时间必须是有限非负数，`end >= start`，且按开始时间有序。
pub fn validate_segments(segments: &[TranscriptSegment]) -> Result<(), InputError> {
    if segments.is_empty() {
        return Err(InputError::EmptyTranscript);
    }

    let mut previous_start = f64::NEG_INFINITY;
    for (index, segment) in segments.iter().enumerate() {
        let reason = if !segment.start_seconds.is_finite() || !segment.end_seconds.is_finite() {
            Some("时间戳不是有限数".to_string())
        } else if segment.start_seconds < 0.0 {
            Some(format!("开始时间为负: {}", segment.start_seconds))
        } else if segment.end_seconds < segment.start_seconds {
            Some(format!(
                "结束时间 {} 早于开始时间 {}",
                segment.end_seconds, segment.start_seconds
            ))
        } else if segment.start_seconds < previous_start {
            Some(format!(
                "片段未按开始时间排序 ({} < {})",
                segment.start_seconds, previous_start
            ))
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(InputError::InvalidSegment { index, reason });
        }
        previous_start = segment.start_seconds;
    }

    Ok(())
}

/// 视频时长：取所有片段中最大的结束时间
pub fn video_duration(segments: &[TranscriptSegment]) -> f64 {
    segments
        .iter()
        .map(|s| s.end_seconds)
        .fold(0.0, f64::max)
}

/// 拼接与时间窗口有重叠的片段文本
pub fn excerpt_between(segments: &[TranscriptSegment], start: f64, end: f64) -> String {
    segments
        .iter()
        .filter(|s| s.end_seconds >= start && s.start_seconds <= end)
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
