//! execute_query / explain_query：经 SqlBackend 执行 SQL
//!
//! 后端错误（语法、未知列、只读拒绝、超时）作为 in-band Failure 返回，
//! 由编排循环作为 failureReason 回灌给 generate_sql。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::actions::params::{parse_params, SqlParams};
use crate::actions::{Action, ActionResult};
use crate::backend::{Row, SqlBackend};
use crate::core::AgentError;

pub const EXECUTE_QUERY: &str = "execute_query";
pub const EXPLAIN_QUERY: &str = "explain_query";

fn sql_schema(description: &str) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "sql": { "type": "string", "description": description }
        },
        "required": ["sql"]
    })
}

fn rows_to_result(action: &str, sql: &str, rows: Result<Vec<Row>, String>) -> ActionResult {
    match rows {
        Ok(rows) => {
            tracing::info!(action, sql = %sql, rows = rows.len(), "query ok");
            ActionResult::success(Value::Array(rows.into_iter().map(Value::Object).collect()))
        }
        Err(e) => {
            tracing::info!(action, sql = %sql, error = %e, "query failed");
            ActionResult::failure(e)
        }
    }
}

pub struct ExecuteQueryAction {
    backend: Arc<dyn SqlBackend>,
}

impl ExecuteQueryAction {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Action for ExecuteQueryAction {
    fn name(&self) -> &str {
        EXECUTE_QUERY
    }

    fn description(&self) -> &str {
        "Run a checked SELECT statement and return the rows."
    }

    fn parameters_schema(&self) -> Value {
        sql_schema("The SQL statement to run; must be the one that passed check_query")
    }

    async fn execute(&self, params: Value) -> Result<ActionResult, AgentError> {
        let p: SqlParams = parse_params(EXECUTE_QUERY, params)?;
        let rows = self.backend.query(&p.sql).await;
        Ok(rows_to_result(EXECUTE_QUERY, &p.sql, rows))
    }
}

pub struct ExplainQueryAction {
    backend: Arc<dyn SqlBackend>,
}

impl ExplainQueryAction {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Action for ExplainQueryAction {
    fn name(&self) -> &str {
        EXPLAIN_QUERY
    }

    fn description(&self) -> &str {
        "Show the database's execution plan for a SQL statement without running it."
    }

    fn parameters_schema(&self) -> Value {
        sql_schema("The SQL statement to explain")
    }

    async fn execute(&self, params: Value) -> Result<ActionResult, AgentError> {
        let p: SqlParams = parse_params(EXPLAIN_QUERY, params)?;
        let plan = self.backend.explain(&p.sql).await;
        Ok(rows_to_result(EXPLAIN_QUERY, &p.sql, plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SqliteBackend;
    use rusqlite::Connection;
    use serde_json::json;

    fn backend() -> Arc<dyn SqlBackend> {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO t VALUES (1, 'a'), (2, 'b');",
        )
        .unwrap();
        Arc::new(SqliteBackend::from_connection(conn, true).unwrap())
    }

    #[tokio::test]
    async fn test_execute_returns_rows() {
        let action = ExecuteQueryAction::new(backend());
        let r = action
            .execute(json!({"sql": "SELECT name FROM t ORDER BY id"}))
            .await
            .unwrap();
        assert_eq!(r.serialize(), r#"[{"name":"a"},{"name":"b"}]"#);
    }

    #[tokio::test]
    async fn test_backend_error_is_in_band() {
        let action = ExecuteQueryAction::new(backend());
        let r = action.execute(json!({"sql": "SELECT foo FROM t"})).await.unwrap();
        assert!(r.is_error());
        assert!(r.error_message().unwrap().contains("no such column: foo"));
    }

    #[tokio::test]
    async fn test_missing_sql_is_invalid_parameters() {
        let action = ExplainQueryAction::new(backend());
        let err = action.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters { ref action, .. } if action == EXPLAIN_QUERY));
    }

    #[tokio::test]
    async fn test_explain_plan() {
        let action = ExplainQueryAction::new(backend());
        let r = action.execute(json!({"sql": "SELECT * FROM t WHERE id = 1"})).await.unwrap();
        assert!(!r.is_error());
        let plan: serde_json::Value = serde_json::from_str(&r.serialize()).unwrap();
        assert!(plan.as_array().is_some_and(|a| !a.is_empty()));
    }
}
