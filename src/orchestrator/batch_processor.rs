//! 批量字幕处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量字幕的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：写日志头、创建出题器与缓存
//! 2. **批量加载**：扫描字幕目录下的全部 `*.json`
//! 3. **并发控制**：使用 Semaphore 限制并发数量，每份字幕一个任务
//! 4. **分批处理**：将字幕分批次处理，每批完成后再开始下一批
//! 5. **结果输出**：每份字幕写出 `output_folder/<fingerprint>.json`
//! 6. **全局统计**：汇总达标、部分、失败的数量
//!
//! 不同指纹的任务互不阻塞；同一指纹的并发请求由 `GenerationService` 串行化。

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::cache_store::{CacheStore, JsonFileCacheStore};
use crate::models::loaders::{list_transcript_files, load_transcript};
use crate::models::output::{OutputStatus, QuizOutput};
use crate::models::record::GenerationMode;
use crate::orchestrator::generation_service::GenerationService;
use crate::services::llm_service::{LlmDrafter, QuestionDrafter};
use crate::services::quality_validator::CURRENT_RULE_VERSION;
use crate::utils::fingerprint::{fingerprint_segments, fingerprint_source};
use crate::utils::logging;

/// 单份字幕的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptResult {
    /// 达到目标题数
    Success,
    /// 如实输出了不足目标数的题目
    Partial,
    /// 未产出任何结果
    Failed,
}

/// 应用主结构
pub struct App<D: QuestionDrafter + 'static = LlmDrafter, S: CacheStore + 'static = JsonFileCacheStore> {
    config: Config,
    service: Arc<GenerationService<D, S>>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        let drafter = LlmDrafter::new(&config);
        let store = JsonFileCacheStore::new(&config.cache_folder);
        let service = GenerationService::new(
            drafter,
            store,
            Duration::from_secs(config.generation_timeout_secs),
        );
        Self::with_service(config, service)
    }
}

impl<D: QuestionDrafter + 'static, S: CacheStore + 'static> App<D, S> {
    /// 使用现成的出题服务初始化
    pub fn with_service(config: Config, service: GenerationService<D, S>) -> Result<Self> {
        // 初始化日志文件
        logging::init_log_file(&config.output_log_file)
            .with_context(|| format!("无法创建日志文件: {}", config.output_log_file))?;

        logging::log_startup(
            config.max_concurrent_transcripts,
            config.target_count,
            &CURRENT_RULE_VERSION.to_string(),
        );

        Ok(Self {
            config,
            service: Arc::new(service),
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<ProcessingStats> {
        info!("\n📁 正在扫描待处理的字幕...");
        let files = list_transcript_files(&self.config.transcript_folder).await?;

        if files.is_empty() {
            warn!("⚠️ 没有找到待处理的字幕文件，程序结束");
            return Ok(ProcessingStats::default());
        }

        let max_concurrent = self.config.max_concurrent_transcripts.max(1);
        logging::log_transcripts_loaded(files.len(), max_concurrent);

        fs::create_dir_all(&self.config.output_folder)
            .await
            .with_context(|| format!("无法创建输出目录: {}", self.config.output_folder))?;

        let stats = self.process_all(files, max_concurrent).await?;

        logging::print_final_stats(
            stats.success,
            stats.partial,
            stats.failed,
            stats.total,
            &self.config.output_log_file,
        );

        Ok(stats)
    }

    /// 处理所有字幕
    async fn process_all(&self, files: Vec<PathBuf>, max_concurrent: usize) -> Result<ProcessingStats> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let total = files.len();
        let total_batches = total.div_ceil(max_concurrent);
        let mut stats = ProcessingStats {
            total,
            ..Default::default()
        };

        // 分批处理
        for (batch_idx, batch) in files.chunks(max_concurrent).enumerate() {
            let batch_start = batch_idx * max_concurrent;
            logging::log_batch_start(
                batch_idx + 1,
                total_batches,
                batch_start + 1,
                batch_start + batch.len(),
                total,
            );

            let batch_stats = self.process_batch(batch, batch_start, semaphore.clone()).await?;
            logging::log_batch_complete(batch_idx + 1, batch_stats.success, batch_stats.total);

            stats.success += batch_stats.success;
            stats.partial += batch_stats.partial;
            stats.failed += batch_stats.failed;
        }

        Ok(stats)
    }

    /// 处理单个批次
    async fn process_batch(
        &self,
        batch: &[PathBuf],
        batch_start: usize,
        semaphore: Arc<Semaphore>,
    ) -> Result<ProcessingStats> {
        let mut handles = Vec::new();

        for (idx, path) in batch.iter().enumerate() {
            let index = batch_start + idx + 1;
            let permit = semaphore.clone().acquire_owned().await?;
            let service = self.service.clone();
            let config = self.config.clone();
            let path = path.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                match process_transcript(service.as_ref(), &path, index, &config).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("[字幕 {}] ❌ 处理过程中发生错误: {:#}", index, e);
                        TranscriptResult::Failed
                    }
                }
            });
            handles.push((index, handle));
        }

        // 等待本批所有任务完成
        let mut stats = ProcessingStats {
            total: batch.len(),
            ..Default::default()
        };
        for (index, handle) in handles {
            match handle.await {
                Ok(TranscriptResult::Success) => stats.success += 1,
                Ok(TranscriptResult::Partial) => stats.partial += 1,
                Ok(TranscriptResult::Failed) => stats.failed += 1,
                Err(e) => {
                    error!("[字幕 {}] 任务执行失败: {}", index, e);
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }
}

/// 处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStats {
    pub success: usize,
    pub partial: usize,
    pub failed: usize,
    pub total: usize,
}

/// 处理单份字幕：加载 → 计算指纹 → 取缓存或生成 → 写出结果
pub async fn process_transcript<D: QuestionDrafter, S: CacheStore>(
    service: &GenerationService<D, S>,
    path: &Path,
    index: usize,
    config: &Config,
) -> Result<TranscriptResult> {
    let transcript = load_transcript(path).await?;
    let fingerprint = match &transcript.source_url {
        Some(url) => fingerprint_source(url),
        None => fingerprint_segments(&transcript.segments)?,
    };
    info!(
        "[字幕 {}] 📄 {} ({} 个片段, 指纹 {})",
        index,
        path.display(),
        transcript.segments.len(),
        logging::truncate_text(&fingerprint, 12)
    );

    let generation_config = config.generation_config(GenerationMode::ExamGrade);
    let served = service
        .get_or_generate(&fingerprint, &transcript.segments, &generation_config)
        .await?;

    let Some(record) = served.into_record() else {
        warn!("[字幕 {}] ⚠️ 未检测到锚点，需要降级处理，跳过输出", index);
        append_log_line(
            &config.output_log_file,
            &format!("{}\t{}\tinsufficient_anchors", fingerprint, path.display()),
        )
        .await;
        return Ok(TranscriptResult::Failed);
    };

    let output = QuizOutput::from_record(&record, config.include_answers);
    let output_path = Path::new(&config.output_folder).join(format!("{}.json", fingerprint));
    let content = serde_json::to_string_pretty(&output)?;
    fs::write(&output_path, content)
        .await
        .with_context(|| format!("无法写入输出文件: {}", output_path.display()))?;

    let result = match output.status {
        OutputStatus::Success => TranscriptResult::Success,
        OutputStatus::Partial => TranscriptResult::Partial,
    };
    info!(
        "[字幕 {}] ✓ {}/{} 题 -> {}",
        index,
        output.count,
        record.target_count,
        output_path.display()
    );
    append_log_line(
        &config.output_log_file,
        &format!("{}\t{}\t{}\t{}", fingerprint, path.display(), output.count, record.status.as_str()),
    )
    .await;

    Ok(result)
}

/// 追加一行到运行日志；失败只告警
async fn append_log_line(log_file_path: &str, line: &str) {
    let result = async {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path)
            .await?;
        file.write_all(format!("{}\n", line).as_bytes()).await
    }
    .await;

    if let Err(e) = result {
        warn!("写入日志文件失败 ({}): {}", log_file_path, e);
    }
}
