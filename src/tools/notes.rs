//! 笔记检索工具：search_notes(query, top_k)
//!
//! 从不向调用方抛错：索引为空、无命中、检索失败都退化为单条说明性结果（source 为 system / error）。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::memory::{NoteHit, NotesIndex};
use crate::tools::{ParamSpec, Tool};

fn notice(content: impl Into<String>, source: &str) -> Vec<NoteHit> {
    vec![NoteHit {
        content: content.into(),
        source: source.to_string(),
        score: 0.0,
    }]
}

/// 检索笔记；任何失败都转为一条 source="error" 的结果
pub async fn search_notes(index: &dyn NotesIndex, query: &str, top_k: usize) -> Vec<NoteHit> {
    let count = match index.count().await {
        Ok(n) => n,
        Err(e) => return notice(format!("Error searching notes: {}", e), "error"),
    };
    if count == 0 {
        return notice(
            "No notes have been indexed yet. Please run the ingestion script first.",
            "system",
        );
    }
    match index.search(query, top_k.min(count)).await {
        Ok(hits) if hits.is_empty() => notice("No relevant notes found for your query.", "system"),
        Ok(hits) => hits,
        Err(e) => notice(format!("Error searching notes: {}", e), "error"),
    }
}

/// search_notes 工具
pub struct SearchNotesTool {
    index: Arc<dyn NotesIndex>,
    default_top_k: usize,
}

impl SearchNotesTool {
    pub fn new(index: Arc<dyn NotesIndex>, default_top_k: usize) -> Self {
        Self {
            index,
            default_top_k,
        }
    }
}

#[async_trait]
impl Tool for SearchNotesTool {
    fn name(&self) -> &str {
        "search_notes"
    }

    fn description(&self) -> &str {
        "Search the user's personal notes (fitness plans, recipes, personal information)"
    }

    fn input_schema(&self) -> BTreeMap<String, ParamSpec> {
        BTreeMap::from([
            (
                "query".to_string(),
                ParamSpec::required("string", "The search query to find relevant notes"),
            ),
            (
                "top_k".to_string(),
                ParamSpec::optional("integer", "Number of results to return"),
            ),
        ])
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing required argument: query".to_string())?;
        let top_k = args
            .get("top_k")
            .and_then(|v| v.as_u64())
            .and_then(|k| usize::try_from(k).ok())
            .filter(|k| *k > 0)
            .unwrap_or(self.default_top_k);

        let hits = search_notes(self.index.as_ref(), query, top_k).await;
        serde_json::to_value(hits).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ChunkingConfig, InMemoryNotesIndex};

    struct BrokenIndex;

    #[async_trait]
    impl NotesIndex for BrokenIndex {
        async fn count(&self) -> Result<usize, String> {
            Ok(3)
        }

        async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<NoteHit>, String> {
            Err("index offline".to_string())
        }
    }

    #[tokio::test]
    async fn test_empty_index_returns_system_notice() {
        let hits = search_notes(&InMemoryNotesIndex::new(None), "anything", 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "system");
        assert!(hits[0].content.starts_with("No notes have been indexed yet"));
    }

    #[tokio::test]
    async fn test_no_match_returns_system_notice() {
        let mut index = InMemoryNotesIndex::new(None);
        index
            .add_document("a.md", "squats and lunges", &ChunkingConfig::default())
            .await;
        let hits = search_notes(&index, "sourdough", 5).await;
        assert_eq!(hits[0].content, "No relevant notes found for your query.");
    }

    #[tokio::test]
    async fn test_failure_never_raises() {
        let hits = search_notes(&BrokenIndex, "x", 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "error");
        assert_eq!(hits[0].content, "Error searching notes: index offline");
        assert_eq!(hits[0].score, 0.0);
    }

    #[tokio::test]
    async fn test_tool_returns_json_array() {
        let mut index = InMemoryNotesIndex::new(None);
        index
            .add_document("recipes.md", "lemon pasta recipe", &ChunkingConfig::default())
            .await;
        let tool = SearchNotesTool::new(Arc::new(index), 5);
        let mut args = Map::new();
        args.insert("query".into(), Value::String("pasta".into()));
        let out = tool.execute(args).await.unwrap();
        assert_eq!(out[0]["source"], "recipes.md");
    }
}
