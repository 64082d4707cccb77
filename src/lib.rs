//! # Anchor Quiz
//!
//! 从带时间戳的字幕中生成只能依据原文片段作答的单选题，并保留可复现的审计轨迹
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有存储资源，只暴露读写能力
//! - `CacheStore` - 按 (指纹, 模式) 存取整条生成记录，规则版本不符即未命中
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个锚点或单道题
//! - `AnchorDetector` - 锚点检测
//! - `context_window` - 上下文窗口构建
//! - `LlmDrafter` - LLM 起草候选题
//! - `QualityValidator` - 五项顺序校验
//! - `deduplicator` - 增量去重
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个锚点变体"的完整处理流程
//! - `AttemptCtx` - 上下文封装（锚点 + 变体）
//! - `QuestionFlow` - 状态机（起草 → 校验 → 接受 / 重试 / 放弃）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/generation` - 单份字幕的出题编排
//! - `orchestrator/generation_service` - 缓存、加锁与超时
//! - `orchestrator/batch_processor` - 批量字幕处理器，管理并发
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, GenerationConfig, ShortfallPolicy};
pub use error::{AppError, AppResult};
pub use infrastructure::{CacheStore, JsonFileCacheStore, MemoryCacheStore};
pub use models::{GenerationMode, GenerationRecord, QuizOutput, TranscriptSegment};
pub use orchestrator::{generate, App, GenerationService, Served};
pub use services::{LlmDrafter, QuestionDrafter, CURRENT_RULE_VERSION};
pub use workflow::{AttemptCtx, QuestionFlow};
