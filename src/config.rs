use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::models::record::GenerationMode;

/// 题数不足时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortfallPolicy {
    /// 如实返回已有题目，状态标记为 partial
    #[default]
    Partial,
    /// 用额外的提问变体把所有锚点再扫一遍（仍按考试级校验）
    SecondPass,
}

impl ShortfallPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "partial" => Some(ShortfallPolicy::Partial),
            "second_pass" => Some(ShortfallPolicy::SecondPass),
            _ => None,
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时处理的字幕数量
    pub max_concurrent_transcripts: usize,
    /// 字幕 JSON 存放目录
    pub transcript_folder: String,
    /// 出题结果输出目录
    pub output_folder: String,
    /// 生成记录缓存目录
    pub cache_folder: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    // --- 出题配置 ---
    pub target_count: usize,
    pub max_retries_per_anchor: u32,
    pub variants_per_anchor: u32,
    pub span_seconds: f64,
    pub include_answers: bool,
    pub generation_timeout_secs: u64,
    pub shortfall_policy: ShortfallPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_transcripts: 8,
            transcript_folder: "transcripts".to_string(),
            output_folder: "output_quiz".to_string(),
            cache_folder: ".quiz_cache".to_string(),
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_temperature: 0.3,
            llm_max_tokens: 1024,
            target_count: 10,
            max_retries_per_anchor: 2,
            variants_per_anchor: 2,
            span_seconds: 24.0,
            include_answers: false,
            generation_timeout_secs: 300,
            shortfall_policy: ShortfallPolicy::Partial,
        }
    }
}

/// TOML 配置文件，所有字段可选
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    max_concurrent_transcripts: Option<usize>,
    transcript_folder: Option<String>,
    output_folder: Option<String>,
    cache_folder: Option<String>,
    output_log_file: Option<String>,
    verbose_logging: Option<bool>,
    llm_api_key: Option<String>,
    llm_api_base_url: Option<String>,
    llm_model_name: Option<String>,
    llm_temperature: Option<f32>,
    llm_max_tokens: Option<u32>,
    target_count: Option<usize>,
    max_retries_per_anchor: Option<u32>,
    variants_per_anchor: Option<u32>,
    span_seconds: Option<f64>,
    include_answers: Option<bool>,
    generation_timeout_secs: Option<u64>,
    shortfall_policy: Option<ShortfallPolicy>,
}

impl Config {
    /// 默认值 → 环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env()
    }

    /// 默认值 → TOML 文件 → 环境变量，后者覆盖前者
    ///
    /// `QUIZ_CONFIG` 指定配置文件路径，未设置时查找 `quiz.toml`，不存在则跳过。
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("QUIZ_CONFIG").unwrap_or_else(|_| "quiz.toml".to_string());
        let base = if Path::new(&path).exists() {
            Self::from_toml_file(&path)?
        } else {
            Self::default()
        };
        base.with_env()
    }

    /// 从 TOML 文件加载，缺失字段取默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    fn from_toml_str(content: &str, path: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
                path: path.to_string(),
                source,
            })?;

        let default = Self::default();
        Ok(Self {
            max_concurrent_transcripts: file.max_concurrent_transcripts.unwrap_or(default.max_concurrent_transcripts),
            transcript_folder: file.transcript_folder.unwrap_or(default.transcript_folder),
            output_folder: file.output_folder.unwrap_or(default.output_folder),
            cache_folder: file.cache_folder.unwrap_or(default.cache_folder),
            output_log_file: file.output_log_file.unwrap_or(default.output_log_file),
            verbose_logging: file.verbose_logging.unwrap_or(default.verbose_logging),
            llm_api_key: file.llm_api_key.unwrap_or(default.llm_api_key),
            llm_api_base_url: file.llm_api_base_url.unwrap_or(default.llm_api_base_url),
            llm_model_name: file.llm_model_name.unwrap_or(default.llm_model_name),
            llm_temperature: file.llm_temperature.unwrap_or(default.llm_temperature),
            llm_max_tokens: file.llm_max_tokens.unwrap_or(default.llm_max_tokens),
            target_count: file.target_count.unwrap_or(default.target_count),
            max_retries_per_anchor: file.max_retries_per_anchor.unwrap_or(default.max_retries_per_anchor),
            variants_per_anchor: file.variants_per_anchor.unwrap_or(default.variants_per_anchor),
            span_seconds: file.span_seconds.unwrap_or(default.span_seconds),
            include_answers: file.include_answers.unwrap_or(default.include_answers),
            generation_timeout_secs: file.generation_timeout_secs.unwrap_or(default.generation_timeout_secs),
            shortfall_policy: file.shortfall_policy.unwrap_or(default.shortfall_policy),
        })
    }

    /// 用环境变量覆盖
    fn with_env(self) -> Result<Self, ConfigError> {
        self.with_vars(|name| std::env::var(name).ok())
    }

    /// 用给定的变量来源覆盖；值无法解析时报错，不会静默忽略
    fn with_vars(self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let text = |name: &str, current: String| lookup(name).unwrap_or(current);

        Ok(Self {
            max_concurrent_transcripts: parse_var(&lookup, "MAX_CONCURRENT_TRANSCRIPTS", self.max_concurrent_transcripts)?,
            transcript_folder: text("TRANSCRIPT_FOLDER", self.transcript_folder),
            output_folder: text("OUTPUT_FOLDER", self.output_folder),
            cache_folder: text("CACHE_FOLDER", self.cache_folder),
            output_log_file: text("OUTPUT_LOG_FILE", self.output_log_file),
            verbose_logging: parse_var(&lookup, "VERBOSE_LOGGING", self.verbose_logging)?,
            llm_api_key: text("LLM_API_KEY", self.llm_api_key),
            llm_api_base_url: text("LLM_API_BASE_URL", self.llm_api_base_url),
            llm_model_name: text("LLM_MODEL_NAME", self.llm_model_name),
            llm_temperature: parse_var(&lookup, "LLM_TEMPERATURE", self.llm_temperature)?,
            llm_max_tokens: parse_var(&lookup, "LLM_MAX_TOKENS", self.llm_max_tokens)?,
            target_count: parse_var(&lookup, "TARGET_COUNT", self.target_count)?,
            max_retries_per_anchor: parse_var(&lookup, "MAX_RETRIES_PER_ANCHOR", self.max_retries_per_anchor)?,
            variants_per_anchor: parse_var(&lookup, "VARIANTS_PER_ANCHOR", self.variants_per_anchor)?,
            span_seconds: parse_var(&lookup, "SPAN_SECONDS", self.span_seconds)?,
            include_answers: parse_var(&lookup, "INCLUDE_ANSWERS", self.include_answers)?,
            generation_timeout_secs: parse_var(&lookup, "GENERATION_TIMEOUT_SECS", self.generation_timeout_secs)?,
            shortfall_policy: match lookup("SHORTFALL_POLICY") {
                Some(value) => ShortfallPolicy::parse(&value)
                    .ok_or_else(|| env_parse_error("SHORTFALL_POLICY", &value, "partial | second_pass"))?,
                None => self.shortfall_policy,
            },
        })
    }

    /// 单份字幕的出题配置
    pub fn generation_config(&self, mode: GenerationMode) -> GenerationConfig {
        GenerationConfig {
            mode,
            target_count: self.target_count,
            max_retries_per_anchor: self.max_retries_per_anchor,
            variants_per_anchor: self.variants_per_anchor,
            span_seconds: self.span_seconds,
            shortfall_policy: self.shortfall_policy,
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    current: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| env_parse_error(name, &value, std::any::type_name::<T>())),
        None => Ok(current),
    }
}

fn env_parse_error(name: &str, value: &str, expected_type: &str) -> ConfigError {
    ConfigError::EnvVarParseFailed {
        var_name: name.to_string(),
        value: value.to_string(),
        expected_type: expected_type.to_string(),
    }
}

/// 一次生成请求的显式配置，沿编排层逐级传递
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub mode: GenerationMode,
    pub target_count: usize,
    /// 首次尝试之外的重试次数
    pub max_retries_per_anchor: u32,
    /// 每个锚点尝试的提问变体数
    pub variants_per_anchor: u32,
    pub span_seconds: f64,
    pub shortfall_policy: ShortfallPolicy,
}

impl GenerationConfig {
    pub fn new(mode: GenerationMode, target_count: usize) -> Self {
        Self {
            mode,
            target_count,
            ..Self::default()
        }
    }

    /// 每个 (锚点, 变体) 最多尝试次数
    pub fn max_attempts(&self) -> u32 {
        self.max_retries_per_anchor.saturating_add(1)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Config::default().generation_config(GenerationMode::ExamGrade)
    }
}
