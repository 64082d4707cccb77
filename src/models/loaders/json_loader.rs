use crate::models::transcript::TranscriptSegment;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 已加载的字幕文件
#[derive(Debug, Clone)]
pub struct TranscriptFile {
    /// 来源地址（用于计算指纹）
    pub source_url: Option<String>,
    pub segments: Vec<TranscriptSegment>,
    pub file_path: PathBuf,
}

/// 支持两种格式：片段数组，或带 source_url 的对象
#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptDocument {
    Bare(Vec<TranscriptSegment>),
    Wrapped {
        #[serde(default)]
        source_url: Option<String>,
        segments: Vec<TranscriptSegment>,
    },
}

/// 解析字幕 JSON 文本
pub fn parse_transcript(content: &str, file_path: &Path) -> Result<TranscriptFile> {
    let document: TranscriptDocument = serde_json::from_str(content)
        .with_context(|| format!("无法解析字幕文件: {}", file_path.display()))?;

    let (source_url, segments) = match document {
        TranscriptDocument::Bare(segments) => (None, segments),
        TranscriptDocument::Wrapped {
            source_url,
            segments,
        } => (source_url, segments),
    };

    Ok(TranscriptFile {
        source_url,
        segments,
        file_path: file_path.to_path_buf(),
    })
}

/// 从 JSON 文件加载字幕
pub async fn load_transcript(file_path: &Path) -> Result<TranscriptFile> {
    let content = fs::read_to_string(file_path)
        .await
        .with_context(|| format!("无法读取字幕文件: {}", file_path.display()))?;

    parse_transcript(&content, file_path)
}

/// 列出文件夹中所有 JSON 字幕文件（按文件名排序）
pub async fn list_transcript_files(folder_path: &str) -> Result<Vec<PathBuf>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut files = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            files.push(path);
        }
    }

    if files.is_empty() {
        tracing::warn!("在文件夹 {} 中没有找到 JSON 字幕文件", folder_path);
    }

    files.sort();
    Ok(files)
}
