//! 出题尝试上下文
//!
//! 封装"我正在为哪个锚点的哪个变体出题"这一信息

use std::fmt::Display;

use crate::models::anchor::{Anchor, AnchorType};

/// 出题尝试上下文
#[derive(Debug, Clone)]
pub struct AttemptCtx {
    pub anchor_id: String,
    pub anchor_type: AnchorType,
    /// 变体序号（第二轮补扫时会超过类型自带的变体数）
    pub variant: u32,
    /// 首次尝试 + 重试次数
    pub max_attempts: u32,
}

impl AttemptCtx {
    pub fn new(anchor: &Anchor, variant: u32, max_attempts: u32) -> Self {
        Self {
            anchor_id: anchor.id.clone(),
            anchor_type: anchor.anchor_type,
            variant,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn variant_name(&self) -> &'static str {
        self.anchor_type.variant_name(self.variant)
    }
}

impl Display for AttemptCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[锚点 {} ({}) 变体#{} {}]",
            self.anchor_id,
            self.anchor_type,
            self.variant,
            self.variant_name()
        )
    }
}
