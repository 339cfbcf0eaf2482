//! 库结构：表信息、格式化与按 RAG 上下文筛选
//!
//! 表信息来源按顺序：显式给定 → tables.json 文件 → SQLite 内省；首次加载后缓存。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::backend::SqliteBackend;
use crate::core::AgentError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyReference {
    pub referenced_table: String,
    pub referenced_column: String,
}

impl ForeignKeyReference {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            referenced_table: table.into(),
            referenced_column: column.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    /// 外键列 -> 被引用的表与列
    #[serde(default)]
    pub foreign_keys: BTreeMap<String, ForeignKeyReference>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table_name: name.into(),
            ..Default::default()
        }
    }

    /// `-- Table: t` 块（拼入 generate_sql 的 DATABASE SCHEMA）
    pub fn to_prompt_block(&self) -> String {
        let mut s = format!("-- Table: {}\n", self.table_name);
        s.push_str(&format!("Columns: {}\n", self.columns.join(", ")));
        if !self.primary_keys.is_empty() {
            s.push_str(&format!("Primary key: {}\n", self.primary_keys.join(", ")));
        }
        if !self.foreign_keys.is_empty() {
            s.push_str("Foreign keys:\n");
            for (fk, r) in &self.foreign_keys {
                s.push_str(&format!("  {} -> {}({})\n", fk, r.referenced_table, r.referenced_column));
            }
        }
        s.push('\n');
        s
    }

    /// 知识库句子（供检索）
    pub fn description(&self) -> String {
        let mut s = format!(
            "The {} table has columns: {}.",
            self.table_name,
            self.columns.join(", ")
        );
        if !self.primary_keys.is_empty() {
            s.push_str(&format!(" Primary key: {}.", self.primary_keys.join(", ")));
        }
        if !self.foreign_keys.is_empty() {
            s.push_str(" Foreign keys: ");
            for (fk, r) in &self.foreign_keys {
                s.push_str(&format!("{} references {}({}); ", fk, r.referenced_table, r.referenced_column));
            }
        }
        s.trim().to_string()
    }
}

/// 库结构提供者
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn tables(&self) -> Result<Vec<TableInfo>, AgentError>;

    /// 名字出现在 RAG 上下文中的表（大小写不敏感）
    async fn relevant_schema(&self, rag_context: &str) -> Result<String, AgentError> {
        let ctx = rag_context.to_lowercase();
        Ok(self
            .tables()
            .await?
            .iter()
            .filter(|t| ctx.contains(&t.table_name.to_lowercase()))
            .map(TableInfo::to_prompt_block)
            .collect())
    }

    async fn full_schema(&self) -> Result<String, AgentError> {
        Ok(self.tables().await?.iter().map(TableInfo::to_prompt_block).collect())
    }

    /// 表名与列名
    async fn vocabulary(&self) -> Result<Vec<String>, AgentError> {
        let mut names = Vec::new();
        for t in self.tables().await? {
            names.push(t.table_name);
            names.extend(t.columns);
        }
        Ok(names)
    }

    async fn descriptions(&self) -> Result<Vec<String>, AgentError> {
        Ok(self.tables().await?.iter().map(TableInfo::description).collect())
    }
}

/// 默认实现：文件优先，其次内省，结果缓存
pub struct SchemaCatalog {
    tables_path: Option<PathBuf>,
    introspect: Option<Arc<SqliteBackend>>,
    cache: OnceCell<Vec<TableInfo>>,
}

impl SchemaCatalog {
    pub fn from_tables(tables: Vec<TableInfo>) -> Self {
        Self {
            tables_path: None,
            introspect: None,
            cache: OnceCell::new_with(Some(tables)),
        }
    }

    pub fn new(tables_path: Option<PathBuf>, introspect: Option<Arc<SqliteBackend>>) -> Self {
        Self {
            tables_path,
            introspect,
            cache: OnceCell::new(),
        }
    }

    async fn load(&self) -> Result<Vec<TableInfo>, AgentError> {
        let mut tables = match &self.tables_path {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(text) => serde_json::from_str::<Vec<TableInfo>>(&text).unwrap_or_else(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "tables file is not valid JSON");
                    Vec::new()
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "tables file not readable");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        if tables.is_empty() {
            if let Some(backend) = &self.introspect {
                tables = backend.table_infos().await?;
            }
        }
        tracing::info!(tables = tables.len(), "schema loaded");
        Ok(tables)
    }
}

#[async_trait]
impl SchemaProvider for SchemaCatalog {
    async fn tables(&self) -> Result<Vec<TableInfo>, AgentError> {
        self.cache.get_or_try_init(|| self.load()).await.cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TableInfo> {
        let mut wo = TableInfo::new("work_order");
        wo.columns = vec!["work_order_id".into(), "work_order_status_id".into()];
        wo.primary_keys = vec!["work_order_id".into()];
        wo.foreign_keys.insert(
            "work_order_status_id".into(),
            ForeignKeyReference::new("work_order_status", "work_order_status_id"),
        );
        let mut wos = TableInfo::new("work_order_status");
        wos.columns = vec!["work_order_status_id".into(), "display_name".into()];
        vec![wo, wos]
    }

    #[test]
    fn test_prompt_block_format() {
        assert_eq!(
            sample()[0].to_prompt_block(),
            "-- Table: work_order\nColumns: work_order_id, work_order_status_id\nPrimary key: work_order_id\nForeign keys:\n  work_order_status_id -> work_order_status(work_order_status_id)\n\n"
        );
    }

    #[test]
    fn test_description() {
        assert_eq!(
            sample()[1].description(),
            "The work_order_status table has columns: work_order_status_id, display_name."
        );
        assert!(sample()[0]
            .description()
            .ends_with("Foreign keys: work_order_status_id references work_order_status(work_order_status_id);"));
    }

    #[tokio::test]
    async fn test_relevant_schema_by_name() {
        let catalog = SchemaCatalog::from_tables(sample());
        let s = catalog.relevant_schema("The WORK_ORDER_STATUS table ...").await.unwrap();
        // work_order 是 work_order_status 的子串，两张表都命中
        assert!(s.contains("-- Table: work_order\n"));
        assert!(s.contains("-- Table: work_order_status\n"));
        assert!(catalog.relevant_schema("nothing here").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tables_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables.json");
        std::fs::write(
            &path,
            r#"[{"tableName": "asset", "columns": ["asset_id", "name"], "primaryKeys": ["asset_id"]}]"#,
        )
        .unwrap();
        let catalog = SchemaCatalog::new(Some(path), None);
        let vocab = catalog.vocabulary().await.unwrap();
        assert_eq!(vocab, vec!["asset", "asset_id", "name"]);
    }

    #[tokio::test]
    async fn test_missing_file_yields_empty() {
        let catalog = SchemaCatalog::new(Some(PathBuf::from("/nonexistent/tables.json")), None);
        assert!(catalog.tables().await.unwrap().is_empty());
    }
}
