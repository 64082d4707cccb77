//! 上下文窗口构建 - 业务能力层
//!
//! 纯算术：以锚点为中心取窗口，跨度限制在 [12, 40] 秒，两端限制在视频范围内。

use crate::error::InputError;
use crate::models::anchor::Anchor;
use crate::models::transcript::{excerpt_between, TranscriptSegment};
use crate::models::window::ContextWindow;

/// 构建上下文窗口
///
/// 窗口贴边时整体平移以保留跨度，视频短于跨度时取整段视频。
pub fn build(anchor: &Anchor, video_duration: f64, span_seconds: f64) -> Result<ContextWindow, InputError> {
    if !video_duration.is_finite() || video_duration <= 0.0 {
        return Err(InputError::InvalidVideoDuration(video_duration));
    }

    let span = clamp_span(span_seconds);
    let center = anchor.midpoint().clamp(0.0, video_duration);

    let mut start = center - span / 2.0;
    let mut end = start + span;
    if start < 0.0 {
        end -= start;
        start = 0.0;
    }
    if end > video_duration {
        start -= end - video_duration;
        end = video_duration;
    }

    Ok(ContextWindow {
        anchor_id: anchor.id.clone(),
        start_seconds: start.max(0.0),
        end_seconds: end,
    })
}

/// 使用默认跨度构建
pub fn build_default(anchor: &Anchor, video_duration: f64) -> Result<ContextWindow, InputError> {
    build(anchor, video_duration, ContextWindow::DEFAULT_SPAN)
}

/// 跨度限制在 [MIN_SPAN, MAX_SPAN]，非法值回退到默认值
pub fn clamp_span(span_seconds: f64) -> f64 {
    if span_seconds.is_finite() {
        span_seconds.clamp(ContextWindow::MIN_SPAN, ContextWindow::MAX_SPAN)
    } else {
        ContextWindow::DEFAULT_SPAN
    }
}

/// 窗口内的字幕原文
pub fn excerpt(segments: &[TranscriptSegment], window: &ContextWindow) -> String {
    excerpt_between(segments, window.start_seconds, window.end_seconds)
}
