//! 笔记索引：search_notes 背后的「查询 → top-k 相关片段」服务
//!
//! NotesIndex 是对外契约；InMemoryNotesIndex 在启动时把笔记目录（.md / .txt）分块装入内存。
//! 配置了嵌入提供方时按余弦相似度打分，否则退化为词集合的 Jaccard 相似度。

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::llm::EmbeddingProvider;

/// 单条检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteHit {
    pub content: String,
    pub source: String,
    pub score: f64,
}

/// 笔记检索契约
#[async_trait]
pub trait NotesIndex: Send + Sync {
    /// 已索引片段数
    async fn count(&self) -> Result<usize, String>;

    /// 返回按分数降序的至多 top_k 条结果
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<NoteHit>, String>;
}

/// 分块策略
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// 目标块大小（字符数）
    pub chunk_size: usize,
    /// 块之间的重叠（字符数）
    pub chunk_overlap: usize,
    /// 分隔符优先级（从高到低）
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ". ".to_string(),
                "! ".to_string(),
                "? ".to_string(),
                " ".to_string(),
            ],
        }
    }
}

/// 笔记片段
#[derive(Debug, Clone, PartialEq)]
pub struct NoteChunk {
    pub text: String,
    pub source: String,
}

/// 将文本切成带重叠的片段（按字符计数，UTF-8 安全），尽量在分隔符处断开
pub fn chunk_text(source: &str, text: &str, config: &ChunkingConfig) -> Vec<NoteChunk> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let size = config.chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let target_end = (start + size).min(total);
        let mut end = target_end;

        if target_end < total {
            let window: String = chars[start..target_end].iter().collect();
            for sep in &config.separators {
                if let Some(pos) = window.rfind(sep.as_str()) {
                    let upto = window[..pos].chars().count() + sep.chars().count();
                    if upto > 0 {
                        end = start + upto;
                        break;
                    }
                }
            }
        }
        if end <= start {
            end = (start + 1).min(total);
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(NoteChunk {
                text: piece.to_string(),
                source: source.to_string(),
            });
        }

        if end >= total {
            break;
        }
        let overlap = config.chunk_overlap.min(end - start);
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

/// 小写化并按非字母数字切词
fn token_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    inter / union
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        f64::from(dot / (norm_a * norm_b))
    }
}

fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

struct IndexedChunk {
    chunk: NoteChunk,
    tokens: HashSet<String>,
    embedding: Option<Vec<f32>>,
}

/// 内存笔记索引
#[derive(Default)]
pub struct InMemoryNotesIndex {
    entries: Vec<IndexedChunk>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl InMemoryNotesIndex {
    pub fn new(embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            entries: Vec::new(),
            embedder,
        }
    }

    /// 分块并索引一篇文档，返回新增片段数；单个片段嵌入失败时该片段只参与关键词打分
    pub async fn add_document(&mut self, source: &str, text: &str, config: &ChunkingConfig) -> usize {
        let chunks = chunk_text(source, text, config);
        let added = chunks.len();
        for chunk in chunks {
            let embedding = match &self.embedder {
                Some(embedder) => match embedder.embed(&chunk.text).await {
                    Ok(v) if !v.is_empty() => Some(v),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(source = %chunk.source, "embedding failed: {}", e);
                        None
                    }
                },
                None => None,
            };
            self.entries.push(IndexedChunk {
                tokens: token_set(&chunk.text),
                chunk,
                embedding,
            });
        }
        added
    }

    /// 递归读取目录下的 .md / .txt 文件；目录不存在时返回空索引，单个文件读不了就跳过
    pub async fn load_dir(
        dir: &Path,
        config: &ChunkingConfig,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self, String> {
        let mut index = Self::new(embedder);
        if !dir.exists() {
            tracing::info!(dir = %dir.display(), "notes directory missing, index left empty");
            return Ok(index);
        }
        let mut files: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|ext| ext.to_str()),
                    Some("md") | Some("txt")
                )
            })
            .collect();
        files.sort();

        for path in files {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping unreadable note: {}", e);
                    continue;
                }
            };
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let n = index.add_document(&source, &text, config).await;
            tracing::debug!(source = %source, chunks = n, "note indexed");
        }
        tracing::info!(chunks = index.len(), "notes index loaded");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl NotesIndex for InMemoryNotesIndex {
    async fn count(&self) -> Result<usize, String> {
        Ok(self.entries.len())
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<NoteHit>, String> {
        let query_embedding = match &self.embedder {
            Some(embedder) => Some(embedder.embed(query).await?),
            None => None,
        };
        let query_tokens = token_set(query);

        let mut scored: Vec<(f64, &NoteChunk)> = self
            .entries
            .iter()
            .map(|entry| {
                let score = match (&query_embedding, &entry.embedding) {
                    (Some(q), Some(e)) => cosine_similarity(q, e),
                    _ => jaccard_similarity(&query_tokens, &entry.tokens),
                };
                (score, &entry.chunk)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, chunk)| NoteHit {
                content: chunk.text.clone(),
                source: chunk.source.clone(),
                score: round4(score),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_respects_size_and_source() {
        let config = ChunkingConfig {
            chunk_size: 40,
            chunk_overlap: 5,
            ..Default::default()
        };
        let text = "Leg day: squats and lunges.\n\nPush day: bench press and dips.\n\nPull day: rows.";
        let chunks = chunk_text("fitness.md", text, &config);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 40);
            assert_eq!(chunk.source, "fitness.md");
        }
    }

    #[test]
    fn test_chunking_is_utf8_safe() {
        let config = ChunkingConfig {
            chunk_size: 3,
            chunk_overlap: 1,
            separators: vec![],
        };
        let chunks = chunk_text("zh.md", "这是一段中文笔记内容", &config);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 3));
    }

    #[tokio::test]
    async fn test_keyword_search_ranks_overlap_first() {
        let mut index = InMemoryNotesIndex::new(None);
        let config = ChunkingConfig::default();
        index
            .add_document("recipes.md", "Pasta carbonara with eggs and pecorino", &config)
            .await;
        index
            .add_document("fitness.md", "Monday squats, Wednesday deadlifts", &config)
            .await;

        let hits = index.search("carbonara pasta", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "recipes.md");
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_load_dir_reads_markdown_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "morning run five km").unwrap();
        std::fs::write(dir.path().join("b.txt"), "grocery list: apples").unwrap();
        std::fs::write(dir.path().join("c.bin"), "ignored").unwrap();
        let index = InMemoryNotesIndex::load_dir(dir.path(), &ChunkingConfig::default(), None)
            .await
            .unwrap();
        assert_eq!(index.len(), 2);

        let missing = InMemoryNotesIndex::load_dir(&dir.path().join("nope"), &ChunkingConfig::default(), None)
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_load_dir_skips_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_recipes.md"), "Shakshuka with eggs and peppers").unwrap();
        std::fs::write(dir.path().join("b_fitness.txt"), [0xff, 0xfe, 0x00, 0x41]).unwrap();
        let index = InMemoryNotesIndex::load_dir(dir.path(), &ChunkingConfig::default(), None)
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        let hits = index.search("shakshuka eggs", 3).await.unwrap();
        assert_eq!(hits[0].source, "a_recipes.md");
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
    }
}
