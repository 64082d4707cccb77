use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 校验规则集版本
///
/// 按 (major, minor, patch) 结构化比较；持久化时写成 "1.4.0" 字符串。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl RuleVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for RuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for RuleVersion {
    type Err = String;

    /// 接受 "1.4.0"、"v1.4"、"2" 等写法，缺省部分补 0
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches(['v', 'V']);
        if trimmed.is_empty() {
            return Err(format!("无效的规则版本: '{}'", s));
        }

        let mut parts = [0u32; 3];
        let pieces: Vec<&str> = trimmed.split('.').collect();
        if pieces.len() > 3 {
            return Err(format!("无效的规则版本: '{}'", s));
        }
        for (slot, piece) in parts.iter_mut().zip(pieces) {
            *slot = piece
                .parse()
                .map_err(|_| format!("无效的规则版本: '{}'", s))?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl TryFrom<String> for RuleVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RuleVersion> for String {
    fn from(version: RuleVersion) -> Self {
        version.to_string()
    }
}
