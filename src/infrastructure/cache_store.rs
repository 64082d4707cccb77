//! 版本化缓存 - 基础设施层
//!
//! 只负责按键读写整条生成记录，不理解记录内容
//!
//! 每个 (指纹, 生成模式) 占一个槽位。`get` 只有在存储记录的校验规则版本
//! 与调用方一致时才算命中，版本不一致一律按未命中处理，规则升级后旧结果自动失效。
//! `peek` 忽略版本，供编排层在重新生成时沿用 `generation_count` 与 `created_at`。

use dashmap::DashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::models::record::{GenerationMode, GenerationRecord};
use crate::models::version::RuleVersion;

/// 缓存存储
pub trait CacheStore: Send + Sync {
    /// 读取未过期的记录
    fn get(
        &self,
        fingerprint: &str,
        mode: GenerationMode,
        rule_version: RuleVersion,
    ) -> impl Future<Output = Result<Option<GenerationRecord>, CacheError>> + Send {
        async move {
            Ok(self
                .peek(fingerprint, mode)
                .await?
                .filter(|record| is_current(record, mode, rule_version)))
        }
    }

    /// 读取槽位中的记录，不检查版本
    fn peek(
        &self,
        fingerprint: &str,
        mode: GenerationMode,
    ) -> impl Future<Output = Result<Option<GenerationRecord>, CacheError>> + Send;

    /// 整条写入，覆盖同一槽位
    fn put(&self, fingerprint: &str, record: &GenerationRecord) -> impl Future<Output = Result<(), CacheError>> + Send;
}

/// 记录的模式与规则版本是否都与调用方一致
pub fn is_current(record: &GenerationRecord, mode: GenerationMode, rule_version: RuleVersion) -> bool {
    let current = record.generation_mode == mode && record.validation_rule_version == rule_version;
    if !current {
        debug!(
            "缓存版本不匹配: 存储 {}/{}，当前 {}/{}",
            record.generation_mode, record.validation_rule_version, mode, rule_version
        );
    }
    current
}

/// 内存缓存（测试与单进程场景）
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    records: DashMap<(String, GenerationMode), GenerationRecord>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 测试辅助：绕过服务直接改写已存记录，用来模拟存储被外部改动
    ///
    /// 生产代码不应调用；记录只能由 `GenerationService` 整条写入。
    pub fn tamper<F>(&self, fingerprint: &str, mode: GenerationMode, f: F) -> bool
    where
        F: FnOnce(&mut GenerationRecord),
    {
        match self.records.get_mut(&(fingerprint.to_string(), mode)) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }
}

impl CacheStore for MemoryCacheStore {
    async fn peek(&self, fingerprint: &str, mode: GenerationMode) -> Result<Option<GenerationRecord>, CacheError> {
        Ok(self
            .records
            .get(&(fingerprint.to_string(), mode))
            .map(|entry| entry.value().clone()))
    }

    async fn put(&self, fingerprint: &str, record: &GenerationRecord) -> Result<(), CacheError> {
        self.records
            .insert((fingerprint.to_string(), record.generation_mode), record.clone());
        Ok(())
    }
}

/// JSON 文件缓存
///
/// 每个槽位一个文件：`<root>/<fingerprint>.<mode>.json`。
/// 写入先落到临时文件再改名，中途失败不会留下半条记录。
#[derive(Debug, Clone)]
pub struct JsonFileCacheStore {
    root: PathBuf,
}

impl JsonFileCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 槽位对应的文件路径
    pub fn record_path(&self, fingerprint: &str, mode: GenerationMode) -> PathBuf {
        let safe: String = fingerprint
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{}.{}.json", safe, mode.as_str()))
    }
}

impl CacheStore for JsonFileCacheStore {
    async fn peek(&self, fingerprint: &str, mode: GenerationMode) -> Result<Option<GenerationRecord>, CacheError> {
        let path = self.record_path(fingerprint, mode);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("⚠️ 缓存文件损坏，按未命中处理 ({}): {}", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn put(&self, fingerprint: &str, record: &GenerationRecord) -> Result<(), CacheError> {
        let io_err = |path: &Path| {
            let path = path.display().to_string();
            move |source| CacheError::Io { path, source }
        };

        fs::create_dir_all(&self.root)
            .await
            .map_err(io_err(&self.root))?;

        let path = self.record_path(fingerprint, record.generation_mode);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(record)?;

        fs::write(&tmp_path, content)
            .await
            .map_err(io_err(&tmp_path))?;
        fs::rename(&tmp_path, &path).await.map_err(io_err(&path))?;

        debug!("缓存已写入: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::{
        compute_evidence_hash, AnchorRecord, GenerationStatus, GenerationSummary, QualityMetrics,
        SCHEMA_VERSION,
    };
    use crate::models::transcript::{video_duration, TranscriptSegment};
    use crate::services::{anchor_detector, context_window};
    use chrono::Utc;

    const V1: RuleVersion = RuleVersion::new(1, 4, 0);
    const V2: RuleVersion = RuleVersion::new(1, 5, 0);

    fn record(fingerprint: &str, rule_version: RuleVersion) -> GenerationRecord {
        record_with_anchors(fingerprint, rule_version, Vec::new())
    }

    fn record_with_anchors(fingerprint: &str, rule_version: RuleVersion, anchors: Vec<AnchorRecord>) -> GenerationRecord {
        let summary = GenerationSummary::from_parts(&anchors, &[], 0);
        let evidence_hash = compute_evidence_hash(SCHEMA_VERSION, &anchors, &summary).unwrap();
        let now = Utc::now();
        GenerationRecord {
            fingerprint: fingerprint.to_string(),
            generation_mode: GenerationMode::ExamGrade,
            validation_rule_version: rule_version,
            schema_version: SCHEMA_VERSION,
            generation_count: 1,
            status: GenerationStatus::Partial,
            target_count: 10,
            quality_metrics: QualityMetrics {
                anchors,
                generation_summary: summary,
                evidence_hash,
            },
            questions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_memory_store_version_mismatch_is_miss() {
        let store = MemoryCacheStore::new();
        store.put("fp", &record("fp", V1)).await.unwrap();

        let hit = store.get("fp", GenerationMode::ExamGrade, V1).await.unwrap();
        assert_eq!(hit.map(|r| r.validation_rule_version), Some(V1));

        assert!(store.get("fp", GenerationMode::ExamGrade, V2).await.unwrap().is_none());
        assert!(store.get("fp", GenerationMode::Degraded, V1).await.unwrap().is_none());
        assert!(store.peek("fp", GenerationMode::ExamGrade).await.unwrap().is_some());
        assert!(store.get("other", GenerationMode::ExamGrade, V1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCacheStore::new(dir.path().join("cache"));

        assert!(store.get("fp", GenerationMode::ExamGrade, V1).await.unwrap().is_none());

        let stored = record("fp", V1);
        store.put("fp", &stored).await.unwrap();

        let loaded = store.get("fp", GenerationMode::ExamGrade, V1).await.unwrap();
        assert_eq!(loaded, Some(stored));
        assert!(store.get("fp", GenerationMode::ExamGrade, V2).await.unwrap().is_none());

        // 临时文件不会残留
        let names: Vec<String> = std::fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["fp.exam_grade.json".to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_keeps_evidence_valid_for_fractional_times() {
        let segments = vec![
            TranscriptSegment::new("First, open the settings page. Then enable two factor login.", 3.0, 10.3),
            TranscriptSegment::new("Storing passwords in plain text is a serious security risk for every user.", 10.3, 17.7),
            TranscriptSegment::new("Unlike TCP, UDP does not guarantee delivery of packets at all.", 17.7, 23.1),
        ];
        let duration = video_duration(&segments);
        let anchors: Vec<AnchorRecord> = anchor_detector::detect(&segments)
            .into_iter()
            .map(|anchor| {
                let mut record = AnchorRecord::new(anchor);
                record.context_window = context_window::build(&record.anchor, duration, 24.0).ok();
                record
            })
            .collect();
        assert_eq!(anchors.len(), 3);
        assert!(anchors.iter().any(|a| a.anchor.start_seconds.fract() != 0.0));

        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCacheStore::new(dir.path());
        let stored = record_with_anchors("fp", V1, anchors);
        assert!(stored.verify_evidence());
        store.put("fp", &stored).await.unwrap();

        let loaded = store.get("fp", GenerationMode::ExamGrade, V1).await.unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert!(loaded.verify_evidence());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCacheStore::new(dir.path());
        std::fs::write(store.record_path("fp", GenerationMode::ExamGrade), "{not json").unwrap();

        assert!(store.peek("fp", GenerationMode::ExamGrade).await.unwrap().is_none());
    }

    #[test]
    fn test_record_path_is_sanitized() {
        let store = JsonFileCacheStore::new("/tmp/cache");
        let path = store.record_path("../evil/fp", GenerationMode::Degraded);
        assert_eq!(path, PathBuf::from("/tmp/cache/___evil_fp.degraded.json"));
    }

    #[tokio::test]
    async fn test_tamper_changes_stored_record() {
        let store = MemoryCacheStore::new();
        store.put("fp", &record("fp", V1)).await.unwrap();
        assert!(store.tamper("fp", GenerationMode::ExamGrade, |r| r.quality_metrics.generation_summary.total_questions = 99));

        let tampered = store.peek("fp", GenerationMode::ExamGrade).await.unwrap().unwrap();
        assert!(!tampered.verify_evidence());
        assert!(!store.tamper("missing", GenerationMode::ExamGrade, |_| {}));
    }
}
