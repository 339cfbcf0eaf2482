//! SQL 执行后端：执行单条只读语句，返回行或错误描述
//!
//! 错误以字符串返回，由 execute_query / explain_query 包装为 in-band 的 ActionResult::Failure。

pub mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use sqlite::SqliteBackend;

/// 一行结果：列名 -> 值（保持列顺序）
pub type Row = Map<String, Value>;

#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// 执行查询
    async fn query(&self, sql: &str) -> Result<Vec<Row>, String>;

    /// 返回执行计划行
    async fn explain(&self, sql: &str) -> Result<Vec<Row>, String>;

    /// 方言名（写入 SQL 生成提示词）
    fn dialect(&self) -> &str {
        "SQL"
    }
}
