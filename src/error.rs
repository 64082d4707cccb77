use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入错误（致命，立即上抛）
    #[error("输入错误: {0}")]
    Input(#[from] InputError),
    /// 草稿生成失败（可重试，仅在预算耗尽后才会冒泡）
    #[error("草稿生成失败: {0}")]
    Draft(#[from] DraftFailure),
    /// 缓存读写错误
    #[error("缓存错误: {0}")]
    Cache(#[from] CacheError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 生成被中途放弃（超时等），不会留下任何记录
    #[error("生成已取消 (指纹: {fingerprint}, 超时: {timeout_secs}s)")]
    Cancelled { fingerprint: String, timeout_secs: u64 },
}

/// 输入错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    /// 视频时长必须为正数
    #[error("视频时长无效: {0}")]
    InvalidVideoDuration(f64),
    /// 字幕为空
    #[error("字幕片段为空")]
    EmptyTranscript,
    /// 片段本身不合法
    #[error("第 {index} 个字幕片段不合法: {reason}")]
    InvalidSegment { index: usize, reason: String },
}

/// 草稿生成失败
///
/// 编排层把它当作可重试的失败，而不是致命错误。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DraftFailure {
    /// 模型调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 模型返回为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyResponse { model: String },
    /// 返回内容不是合法 JSON
    #[error("无法解析LLM返回的JSON: {message}")]
    MalformedJson { message: String },
    /// 缺少必需字段
    #[error("LLM返回缺少字段: {field}")]
    MissingField { field: String },
    /// 正确答案不是 A/B/C/D
    #[error("LLM返回的正确答案无效: {value}")]
    InvalidAnswerKey { value: String },
}

impl DraftFailure {
    /// 审计元数据里使用的稳定代码
    pub fn code(&self) -> &'static str {
        match self {
            DraftFailure::ApiCallFailed { .. } => "draft_api_failed",
            DraftFailure::EmptyResponse { .. } => "draft_empty",
            DraftFailure::MalformedJson { .. } => "draft_malformed_json",
            DraftFailure::MissingField { .. } => "draft_missing_field",
            DraftFailure::InvalidAnswerKey { .. } => "draft_invalid_answer",
        }
    }
}

/// 缓存错误
#[derive(Debug, Error)]
pub enum CacheError {
    /// 文件读写失败
    #[error("缓存文件读写失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 记录序列化失败
    #[error("缓存记录序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("无法读取配置文件 {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Cache(CacheError::Serialize(err))
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
