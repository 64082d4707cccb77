//! LLM 出题服务 - 业务能力层
//!
//! 只负责"起草一道候选题"能力，不关心校验、重试和流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use serde::Deserialize;
use std::future::Future;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::DraftFailure;
use crate::models::anchor::{Anchor, AnchorType};
use crate::models::question::{CandidateQuestion, OptionKey, QuestionOptions};
use crate::services::alignment_rules::required_stem_keywords;

/// 一次起草请求
#[derive(Debug, Clone, PartialEq)]
pub struct DraftRequest {
    pub anchor_id: String,
    pub anchor_type: AnchorType,
    pub concept_text: String,
    /// 上下文窗口内的字幕原文
    pub context_excerpt: String,
    pub variant: u32,
    pub required_stem_keywords: Vec<String>,
}

impl DraftRequest {
    pub fn new(anchor: &Anchor, context_excerpt: impl Into<String>, variant: u32) -> Self {
        Self {
            anchor_id: anchor.id.clone(),
            anchor_type: anchor.anchor_type,
            concept_text: anchor.concept_text.clone(),
            context_excerpt: context_excerpt.into(),
            variant,
            required_stem_keywords: required_stem_keywords(anchor.anchor_type),
        }
    }

    /// 变体名称，例如 PROCESS 的 ordering / missing_step
    pub fn variant_name(&self) -> &'static str {
        self.anchor_type.variant_name(self.variant)
    }
}

/// 起草候选题的能力
///
/// 生产环境由 [`LlmDrafter`] 实现；测试里用脚本化的实现替代。
pub trait QuestionDrafter: Send + Sync {
    fn draft(&self, request: &DraftRequest) -> impl Future<Output = Result<CandidateQuestion, DraftFailure>> + Send;
}

/// 基于 LLM 的出题器
///
/// 职责：
/// - 按锚点类型和变体构建提示词
/// - 调用 LLM API
/// - 解析结构化 JSON 响应
/// - 不做质量校验，不做重试
pub struct LlmDrafter {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmDrafter {
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// 通用的 LLM 调用函数
    ///
    /// 返回 LLM 的响应内容（已去掉首尾空白）
    pub async fn send_to_llm(&self, user_message: &str, system_message: Option<&str>) -> Result<String, DraftFailure> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| self.api_failure(e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| self.api_failure(e))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| self.api_failure(e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            self.api_failure(e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| DraftFailure::EmptyResponse {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }

    fn api_failure(&self, e: impl std::fmt::Display) -> DraftFailure {
        DraftFailure::ApiCallFailed {
            model: self.model_name.clone(),
            message: e.to_string(),
        }
    }
}

impl QuestionDrafter for LlmDrafter {
    async fn draft(&self, request: &DraftRequest) -> Result<CandidateQuestion, DraftFailure> {
        debug!(
            "起草候选题: 锚点 {} ({}), 变体 {}",
            request.anchor_id,
            request.anchor_type,
            request.variant_name()
        );

        let (user_message, system_message) = build_draft_messages(request);
        let response = self.send_to_llm(&user_message, Some(&system_message)).await?;
        parse_draft_response(&response, request)
    }
}

/// 每种锚点类型的题干句式要求
fn stem_instruction(anchor_type: AnchorType) -> &'static str {
    match anchor_type {
        AnchorType::Definition => {
            "题干必须是定义题句式，例如 \"Which of the following best describes ...?\" 或 \"What is the definition of ...?\"，不得询问顺序、步骤或情境选择。"
        }
        AnchorType::Process => {
            "题干必须考查步骤顺序，必须包含 order / sequence / step / first / next / then / finally / before / after 之一，不得写成 \"What is the X that ...?\" 这样的定义题。"
        }
        AnchorType::Risk => {
            "题干必须考查风险或后果，必须包含 risk / danger / warning / avoid / prevent / consequence 之一。"
        }
        AnchorType::Boundary => {
            "题干必须考查适用范围或例外，必须包含 not / except / excluding / only / solely 之一。"
        }
        AnchorType::Decision => {
            "题干必须给出情境并要求做出选择，必须包含 if / when / should / would / choose / decide / scenario 之一。"
        }
        AnchorType::Comparison => {
            "题干必须考查两者的区别，必须包含 differ / difference / compared / versus / unlike / whereas / contrast / distinguish 之一。"
        }
    }
}

/// 每个变体的提问角度
fn variant_instruction(variant_name: &str) -> &'static str {
    match variant_name {
        "direct_definition" => "直接考查概念的定义。",
        "term_identification" => "给出描述，让学生识别对应的术语。",
        "ordering" => "考查各步骤的正确顺序。",
        "missing_step" => "给出部分步骤，考查缺失的那一步。",
        "consequence" => "考查忽视该风险会导致的后果。",
        "prevention" => "考查如何避免或预防该风险。",
        "exception" => "考查规则的例外情况。",
        "scope_limit" => "考查规则适用范围的边界。",
        "scenario_choice" => "给出具体情境，考查应当采取的做法。",
        "trigger_condition" => "考查触发该决策的条件。",
        "contrast" => "考查两者之间最关键的区别。",
        "distinguishing_feature" => "考查能区分两者的特征。",
        _ => "围绕该知识点提问。",
    }
}

/// 构建起草消息
///
/// 返回 (user_message, system_message)
pub fn build_draft_messages(request: &DraftRequest) -> (String, String) {
    let system_message = "You are an exam item writer. You write one English multiple-choice question \
                          that can only be answered from the given transcript excerpt. \
                          你只输出 JSON，不输出任何解释。"
        .to_string();

    let user_message = format!(
        r#"根据下面的字幕片段出一道单选题。

锚点类型: {anchor_type}
知识点: {concept}
提问角度 ({variant}): {variant_instruction}

字幕片段:
"""
{excerpt}
"""

【题干要求】
- {stem_instruction}
- 建议使用的关键词: {keywords}
- 题干至少 20 个字符，是完整的问句，不能以 and / or / then 或省略号结尾
- 不要使用 "this"、"provided"、"aforementioned" 这类模糊指代，直接写出所指的内容
- 题干必须使用字幕片段中的关键词，脱离片段无法作答

【选项要求】
- 四个选项 A/B/C/D，每个 10 到 200 个字符，互不相同
- 选项文本里不要包含 "A."、"B." 之类的选项标签
- 不要用 "->" 或 "→" 连接步骤
- 不要使用 obviously / just / clearly / simply / of course 这类填充词

只返回如下 JSON：
{{"question": "...", "options": {{"A": "...", "B": "...", "C": "...", "D": "..."}}, "correct_answer": "A"}}"#,
        anchor_type = request.anchor_type,
        concept = request.concept_text,
        variant = request.variant_name(),
        variant_instruction = variant_instruction(request.variant_name()),
        excerpt = request.context_excerpt,
        stem_instruction = stem_instruction(request.anchor_type),
        keywords = request.required_stem_keywords.join(", "),
    );

    (user_message, system_message)
}

#[derive(Debug, Deserialize)]
struct RawDraft {
    #[serde(alias = "stem")]
    question: Option<String>,
    options: Option<RawOptions>,
    #[serde(alias = "answer", alias = "correct_key")]
    correct_answer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOptions {
    #[serde(rename = "A", alias = "a")]
    a: Option<String>,
    #[serde(rename = "B", alias = "b")]
    b: Option<String>,
    #[serde(rename = "C", alias = "c")]
    c: Option<String>,
    #[serde(rename = "D", alias = "d")]
    d: Option<String>,
}

/// 截取响应中的 JSON 对象（兼容 ```json 代码块和前后多余文字）
fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

fn required(value: Option<String>, field: &str) -> Result<String, DraftFailure> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DraftFailure::MissingField {
            field: field.to_string(),
        })
}

/// 解析起草响应
pub fn parse_draft_response(response: &str, request: &DraftRequest) -> Result<CandidateQuestion, DraftFailure> {
    let json = extract_json_object(response).ok_or_else(|| DraftFailure::MalformedJson {
        message: "响应中没有 JSON 对象".to_string(),
    })?;

    let raw: RawDraft = serde_json::from_str(json).map_err(|e| DraftFailure::MalformedJson {
        message: e.to_string(),
    })?;

    let stem = required(raw.question, "question")?;
    let options = raw.options.ok_or_else(|| DraftFailure::MissingField {
        field: "options".to_string(),
    })?;
    let options = QuestionOptions::new(
        required(options.a, "options.A")?,
        required(options.b, "options.B")?,
        required(options.c, "options.C")?,
        required(options.d, "options.D")?,
    );

    let answer = required(raw.correct_answer, "correct_answer")?;
    let correct_key =
        OptionKey::parse(&answer).ok_or(DraftFailure::InvalidAnswerKey { value: answer })?;

    Ok(CandidateQuestion {
        anchor_id: request.anchor_id.clone(),
        anchor_type: request.anchor_type,
        variant: request.variant,
        stem,
        options,
        correct_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process_request(variant: u32) -> DraftRequest {
        let anchor = Anchor {
            id: "proc-001".to_string(),
            anchor_type: AnchorType::Process,
            concept_text: "First, create an account. Then verify your email. Finally, log in."
                .to_string(),
            start_seconds: 10.0,
            end_seconds: 14.0,
            source_segment_index: 0,
        };
        DraftRequest::new(&anchor, anchor.concept_text.clone(), variant)
    }

    const GOOD_RESPONSE: &str = r#"```json
{
  "question": "What is the correct order of steps to create an account, verify your email, and log in?",
  "options": {
    "A": "Create an account, verify the email, then log in",
    "B": "Log in, verify the email, then create an account",
    "C": "Verify the email, log in, then create an account",
    "D": "Create an account, log in, then verify the email"
  },
  "correct_answer": "A"
}
```"#;

    #[test]
    fn test_request_carries_variant_and_keywords() {
        let request = process_request(1);
        assert_eq!(request.variant_name(), "missing_step");
        assert!(request.required_stem_keywords.contains(&"order".to_string()));
    }

    #[test]
    fn test_prompt_mentions_label_rule_and_keywords() {
        let (user, system) = build_draft_messages(&process_request(0));
        assert!(user.contains("ordering"));
        assert!(user.contains("\"A.\""));
        assert!(user.contains("order, sequence, step"));
        assert!(user.contains("log in."));
        assert!(system.contains("JSON"));
    }

    #[test]
    fn test_parse_fenced_json() {
        let candidate = parse_draft_response(GOOD_RESPONSE, &process_request(0)).unwrap();
        assert_eq!(candidate.anchor_id, "proc-001");
        assert_eq!(candidate.variant, 0);
        assert_eq!(candidate.correct_key, OptionKey::A);
        assert!(candidate.stem.contains("order"));
        assert_eq!(
            candidate.options.get(OptionKey::D),
            "Create an account, log in, then verify the email"
        );
    }

    #[test]
    fn test_parse_lenient_answer_key() {
        let response = GOOD_RESPONSE.replace("\"correct_answer\": \"A\"", "\"correct_answer\": \"c\"");
        let candidate = parse_draft_response(&response, &process_request(0)).unwrap();
        assert_eq!(candidate.correct_key, OptionKey::C);
    }

    #[test]
    fn test_parse_failures() {
        let request = process_request(0);

        assert!(matches!(
            parse_draft_response("抱歉，我无法完成", &request),
            Err(DraftFailure::MalformedJson { .. })
        ));
        assert!(matches!(
            parse_draft_response("{\"question\": ", &request),
            Err(DraftFailure::MalformedJson { .. })
        ));
        assert_eq!(
            parse_draft_response(r#"{"question": "Which step comes first?", "correct_answer": "A"}"#, &request),
            Err(DraftFailure::MissingField {
                field: "options".to_string()
            })
        );

        let missing_d = GOOD_RESPONSE.replace("\"D\": \"Create an account, log in, then verify the email\"", "\"D\": \"\"");
        assert_eq!(
            parse_draft_response(&missing_d, &request),
            Err(DraftFailure::MissingField {
                field: "options.D".to_string()
            })
        );

        let bad_key = GOOD_RESPONSE.replace("\"correct_answer\": \"A\"", "\"correct_answer\": \"E\"");
        assert_eq!(
            parse_draft_response(&bad_key, &request),
            Err(DraftFailure::InvalidAnswerKey {
                value: "E".to_string()
            })
        );
    }

    /// 测试真实 LLM 出题
    ///
    /// 运行方式：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_live_draft -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_live_draft() {
        let _ = tracing_subscriber::fmt::try_init();

        let drafter = LlmDrafter::new(&Config::from_env().unwrap());
        let result = drafter.draft(&process_request(0)).await;

        match result {
            Ok(candidate) => {
                println!("\n========== 候选题 ==========");
                println!("{}", candidate.stem);
                for (key, text) in candidate.options.iter() {
                    println!("  {}. {}", key, text);
                }
                println!("正确答案: {}", candidate.correct_key);
                println!("============================\n");
            }
            Err(e) => panic!("LLM 出题失败: {}", e),
        }
    }
}
