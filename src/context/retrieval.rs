//! 检索：按问题与历史找出相关的知识片段（表描述、示例 SQL）
//!
//! KeywordRetriever 以词重叠打分；可替换为向量检索实现。

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::AgentError;

/// 检索器：返回按相关度排序的片段
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, previous_context: &str) -> Result<Vec<String>, AgentError>;
}

/// 知识条目；sql_example 存在时额外产出 "Example SQL: ..." 片段（同分）
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeEntry {
    pub text: String,
    #[serde(default)]
    pub sql_example: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KnowledgeFile {
    #[serde(default)]
    entries: Vec<KnowledgeEntry>,
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "what", "which", "who", "how", "many", "much", "all", "show",
    "list", "give", "with", "from", "that", "this", "has", "have", "table", "columns", "of", "is",
    "in", "to", "me", "a", "an",
];

/// 小写词集合；下划线复合词同时保留整体与拆分
fn tokenize(s: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    for raw in s.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        let w = raw.trim_matches('_').to_lowercase();
        if w.len() < 2 || STOPWORDS.contains(&w.as_str()) {
            continue;
        }
        if w.contains('_') {
            out.extend(
                w.split('_')
                    .filter(|p| p.len() > 1 && !STOPWORDS.contains(p))
                    .map(str::to_string),
            );
        }
        out.insert(w);
    }
    out
}

pub struct KeywordRetriever {
    entries: Vec<(KnowledgeEntry, HashSet<String>)>,
    top_k: usize,
}

impl KeywordRetriever {
    pub fn new(top_k: usize) -> Self {
        Self {
            entries: Vec::new(),
            top_k,
        }
    }

    pub fn add_entry(&mut self, entry: KnowledgeEntry) {
        let tokens = tokenize(&entry.text);
        self.entries.push((entry, tokens));
    }

    /// 表描述句子（SchemaProvider::descriptions）
    pub fn with_descriptions(mut self, descriptions: impl IntoIterator<Item = String>) -> Self {
        for text in descriptions {
            self.add_entry(KnowledgeEntry {
                text,
                sql_example: None,
            });
        }
        self
    }

    /// 读取 TOML 知识库（`[[entries]] text / sql_example`）
    pub fn load_file(mut self, path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("knowledge file {}: {}", path.display(), e)))?;
        let file: KnowledgeFile = toml::from_str(&text)
            .map_err(|e| AgentError::Config(format!("knowledge file {}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), entries = file.entries.len(), "knowledge loaded");
        for entry in file.entries {
            self.add_entry(entry);
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn search(&self, text: &str) -> Vec<String> {
        let query_tokens = tokenize(text);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, String)> = Vec::new();
        for (entry, tokens) in &self.entries {
            let score = query_tokens.intersection(tokens).count();
            if score == 0 {
                continue;
            }
            scored.push((score, entry.text.clone()));
            if let Some(sql) = &entry.sql_example {
                scored.push((score, format!("Example SQL: {}", sql)));
            }
        }
        // 稳定排序：同分保持录入顺序
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(self.top_k).map(|(_, t)| t).collect()
    }
}

#[async_trait]
impl ContextRetriever for KeywordRetriever {
    async fn retrieve(&self, query: &str, previous_context: &str) -> Result<Vec<String>, AgentError> {
        let text = if previous_context.is_empty() {
            query.to_string()
        } else {
            format!("{}\n{}", previous_context, query)
        };
        Ok(self.search(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retriever() -> KeywordRetriever {
        let mut r = KeywordRetriever::new(3).with_descriptions([
            "The work_order table has columns: work_order_id, work_order_status_id.".to_string(),
            "The asset table has columns: asset_id, name.".to_string(),
        ]);
        r.add_entry(KnowledgeEntry {
            text: "Status of a work order by its WO number".to_string(),
            sql_example: Some("SELECT wos.display_name FROM work_order wo JOIN work_order_status wos USING (work_order_status_id)".to_string()),
        });
        r
    }

    #[tokio::test]
    async fn test_ranks_by_overlap_and_adds_examples() {
        let chunks = retriever()
            .retrieve("What is the status of work order WO-123?", "")
            .await
            .unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].starts_with("Status of a work order by its WO"));
        assert!(chunks[1].starts_with("Example SQL: SELECT wos.display_name"));
        assert!(chunks[2].starts_with("The work_order table"));
    }

    #[tokio::test]
    async fn test_previous_context_contributes() {
        let r = retriever();
        assert!(r.retrieve("and the total?", "").await.unwrap().is_empty());
        let chunks = r
            .retrieve("and the total?", "User: list asset rows\nAI: [...]")
            .await
            .unwrap();
        assert_eq!(chunks[0], "The asset table has columns: asset_id, name.");
    }

    #[test]
    fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.toml");
        std::fs::write(
            &path,
            "[[entries]]\ntext = \"Open work orders\"\nsql_example = \"SELECT * FROM work_order WHERE closed = 0;\"\n\n[[entries]]\ntext = \"Assets\"\n",
        )
        .unwrap();
        let r = KeywordRetriever::new(3).load_file(&path).unwrap();
        assert_eq!(r.len(), 2);
        assert!(KeywordRetriever::new(3).load_file(dir.path().join("missing.toml")).is_err());
    }
}
