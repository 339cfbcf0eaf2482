//! check_query（别名 validate_query）：SQL 安全性静态检查
//!
//! 纯建议性文本，永不失败；通过时以 "Query Check Passed" 开头，编排循环据此施加
//! 「下一步必须 execute_query 同一条 SQL」的约束。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::actions::params::{parse_params, CheckSqlParams};
use crate::actions::{Action, ActionResult};
use crate::core::AgentError;

pub const CHECK_QUERY: &str = "check_query";
pub const CHECK_QUERY_ALIAS: &str = "validate_query";
pub const CHECK_PASSED_PREFIX: &str = "Query Check Passed";

static FORBIDDEN_RE: OnceLock<Regex> = OnceLock::new();
static QUOTED_RE: OnceLock<Regex> = OnceLock::new();

/// 结果文本是否表示检查通过
pub fn check_passed(result: &ActionResult) -> bool {
    result
        .as_text()
        .is_some_and(|t| t.trim_start().starts_with(CHECK_PASSED_PREFIX))
}

/// 去掉字符串字面量与带引号的标识符（`'it''s'`、`"order"`），关键字与分号只在其余部分查找
fn strip_quoted(sql: &str) -> String {
    let quoted = QUOTED_RE.get_or_init(|| {
        Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*""#).expect("valid regex")
    });
    quoted.replace_all(sql, "''").into_owned()
}

/// 检查单条只读语句：非空、SELECT/WITH 开头、无 DDL/DML 关键字、无多语句
pub fn check_sql(sql: &str) -> String {
    let sql = sql.trim();
    if sql.is_empty() {
        return "Query Check Failed: SQL is empty.".to_string();
    }
    let head = sql.trim_start_matches('(').trim_start();
    let first_word = head
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or("")
        .to_uppercase();
    if first_word != "SELECT" && first_word != "WITH" {
        return "Query Check Failed: Only SELECT statements are allowed.".to_string();
    }
    let forbidden = FORBIDDEN_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(drop|delete|insert|update|alter|truncate|create|grant|revoke|merge)\b")
            .expect("valid regex")
    });
    let code = strip_quoted(sql);
    if let Some(m) = forbidden.find(&code) {
        return format!(
            "Query Check Failed: Dangerous keyword '{}' detected.",
            m.as_str().to_uppercase()
        );
    }
    if code.trim_end_matches(|c: char| c == ';' || c.is_whitespace()).contains(';') {
        return "Query Check Failed: Multiple statements are not allowed.".to_string();
    }
    format!("{}. Can be executed.", CHECK_PASSED_PREFIX)
}

pub struct CheckQueryAction;

#[async_trait]
impl Action for CheckQueryAction {
    fn name(&self) -> &str {
        CHECK_QUERY
    }

    fn description(&self) -> &str {
        "Check the generated SQL query for safety and correctness before running it."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "sql": { "type": "string", "description": "The SQL statement to check" }
            },
            "required": ["sql"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ActionResult, AgentError> {
        let text = match parse_params::<CheckSqlParams>(CHECK_QUERY, params) {
            Ok(p) => check_sql(p.sql.as_deref().unwrap_or("")),
            Err(e) => format!("Query Check Failed: {}", e),
        };
        Ok(ActionResult::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_passes() {
        let out = check_sql("SELECT wos.display_name FROM work_order wo WHERE wo.updated_at > '2024-01-01';");
        assert_eq!(out, "Query Check Passed. Can be executed.");
        assert!(check_sql("with x as (select 1) select * from x").starts_with(CHECK_PASSED_PREFIX));
    }

    #[test]
    fn test_failures() {
        assert_eq!(check_sql("  "), "Query Check Failed: SQL is empty.");
        assert_eq!(
            check_sql("DELETE FROM work_order"),
            "Query Check Failed: Only SELECT statements are allowed."
        );
        assert_eq!(
            check_sql("SELECT 1; DROP TABLE work_order"),
            "Query Check Failed: Dangerous keyword 'DROP' detected."
        );
        assert_eq!(
            check_sql("SELECT 1; SELECT 2;"),
            "Query Check Failed: Multiple statements are not allowed."
        );
    }

    #[test]
    fn test_quoted_text_is_not_scanned() {
        assert!(check_sql("SELECT * FROM work_order WHERE note = 'delete me'").starts_with(CHECK_PASSED_PREFIX));
        assert!(check_sql("SELECT * FROM t WHERE a = 'a;b';").starts_with(CHECK_PASSED_PREFIX));
        assert!(check_sql("SELECT \"update\" FROM t WHERE s = 'it''s; drop'").starts_with(CHECK_PASSED_PREFIX));
        // 引号外的关键字照样拦截
        assert_eq!(
            check_sql("SELECT 'x'; DELETE FROM t"),
            "Query Check Failed: Dangerous keyword 'DELETE' detected."
        );
    }

    #[tokio::test]
    async fn test_execute_and_pass_detection() {
        let r = CheckQueryAction.execute(json!({"sql": "SELECT 1"})).await.unwrap();
        assert!(check_passed(&r));
        let r = CheckQueryAction.execute(json!({})).await.unwrap();
        assert!(!check_passed(&r));
        assert!(!check_passed(&ActionResult::failure("Query Check Passed")));
    }
}
