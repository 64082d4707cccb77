//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量字幕处理器
//! - 管理应用生命周期（初始化、运行）
//! - 扫描字幕目录，控制并发数量（Semaphore）
//! - 写出每份字幕的输出 JSON，输出全局统计信息
//!
//! ### `generation_service` - 缓存感知的出题服务
//! - 生成记录的唯一写入方
//! - 按指纹加锁，超时取消，整条写入
//! - 维护 `generation_count`
//!
//! ### `generation` - 出题编排器
//! - 遍历锚点与变体，直到达到目标题数或锚点用尽
//! - 题数不足时如实返回部分结果
//! - 汇总生成摘要并计算证据哈希
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Transcript>)
//!     ↓
//! generation_service (缓存 + 锁 + 超时)
//!     ↓
//! generation (处理 Vec<Anchor>)
//!     ↓
//! workflow::QuestionFlow (处理单个锚点变体)
//!     ↓
//! services (能力层：detect / window / draft / validate / dedup)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，generation 管单份字幕
//! 2. **单一写入方**：只有 generation_service 写缓存
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **如实报告**：不用低质量内容填补缺口

pub mod batch_processor;
pub mod generation;
pub mod generation_service;

// 重新导出主要类型
pub use batch_processor::{process_transcript, App, ProcessingStats, TranscriptResult};
pub use generation::{generate, GenerationOutcome, Generator};
pub use generation_service::{GenerationService, Served};
