use serde::{Deserialize, Serialize};

/// 上下文窗口：题目必须能够仅凭该时间段的内容作答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub anchor_id: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl ContextWindow {
    /// 默认跨度（秒）
    pub const DEFAULT_SPAN: f64 = 24.0;
    /// 最小跨度（秒）
    pub const MIN_SPAN: f64 = 12.0;
    /// 最大跨度（秒）
    pub const MAX_SPAN: f64 = 40.0;

    pub fn span(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    pub fn contains(&self, seconds: f64) -> bool {
        seconds >= self.start_seconds && seconds <= self.end_seconds
    }
}
