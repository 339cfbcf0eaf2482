//! generate_sql：调用 LLM 生成单条 SELECT，并从自由文本中提取
//!
//! 提取不到 SQL 时返回 NoSqlFound（中断本轮，不写入 Turn）。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::actions::params::{parse_params, GenerateSqlParams};
use crate::actions::sql_extract::extract_sql;
use crate::actions::{Action, ActionResult};
use crate::core::AgentError;
use crate::llm::LlmClient;

pub const GENERATE_SQL: &str = "generate_sql";

pub struct GenerateSqlAction {
    llm: Arc<dyn LlmClient>,
    /// 方言名，写入提示词（如 SQLite、PostgreSQL）
    dialect: String,
}

impl GenerateSqlAction {
    pub fn new(llm: Arc<dyn LlmClient>, dialect: impl Into<String>) -> Self {
        Self {
            llm,
            dialect: dialect.into(),
        }
    }

    fn build_prompt(&self, p: &GenerateSqlParams) -> String {
        let mut sb = String::new();
        sb.push_str(&format!(
            "You are an expert SQL generator for a {} database.\n",
            self.dialect
        ));
        sb.push_str("Given the following context, generate a single, safe, executable SELECT SQL statement that answers the user's question.\n\n");
        sb.push_str("DATABASE SCHEMA:\n");
        sb.push_str(p.database_schema.as_deref().unwrap_or(""));
        sb.push_str("\n\n");
        if let Some(rag) = p.rag_context.as_deref().filter(|s| !s.is_empty()) {
            sb.push_str(&format!("RAG CONTEXT:\n{}\n\n", rag));
        }
        if let Some(prev) = p.previous_context.as_deref().filter(|s| !s.is_empty()) {
            sb.push_str(&format!("CONVERSATION HISTORY:\n{}\n\n", prev));
        }
        sb.push_str(&format!("User Query: {}\n", p.user_query));
        if let Some(reason) = p.failure_reason.as_deref().filter(|s| !s.is_empty()) {
            sb.push_str(&format!("Previous SQL execution failed. Error: {}\n", reason));
            sb.push_str("Regenerate a correct SQL statement that avoids this error.\n");
        }
        sb.push_str("Rules:\n");
        sb.push_str("1. Use only SELECT statements.\n");
        sb.push_str("2. Use exact table and column names from the schema.\n");
        sb.push_str("3. Do not include DDL or DML statements.\n");
        sb.push_str("4. Add LIMIT 100 unless otherwise specified.\n");
        sb.push_str("5. Output only the SQL, either as plain text ending with ';', in a code block, or as a JSON field named 'sql'.\n");
        sb.push_str("6. Do not include explanations or comments.\n");
        if let Some(id) = p.conversation_id.as_deref() {
            sb.push_str(&format!("conversationId: {}\n", id));
        }
        sb
    }
}

#[async_trait]
impl Action for GenerateSqlAction {
    fn name(&self) -> &str {
        GENERATE_SQL
    }

    fn description(&self) -> &str {
        "Generate a SQL statement for a valid user query. Pass failureReason when retrying after a failed execution."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "userQuery": { "type": "string" },
                "failureReason": { "type": ["string", "null"], "description": "Error from the previous attempt" },
                "databaseSchema": { "type": ["string", "null"] },
                "ragContext": { "type": ["string", "null"] },
                "previousContext": { "type": ["string", "null"] },
                "conversationId": { "type": ["string", "null"] }
            },
            "required": ["userQuery"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ActionResult, AgentError> {
        let p: GenerateSqlParams = parse_params(GENERATE_SQL, params)?;
        let prompt = self.build_prompt(&p);
        let output = self.llm.generate(&prompt).await.map_err(AgentError::LlmError)?;
        let sql = extract_sql(&output).inspect_err(|_| {
            tracing::warn!(output = %output, "generate_sql: no SQL in model output");
        })?;
        tracing::info!(sql = %sql, "generate_sql");
        Ok(ActionResult::text(sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use serde_json::json;

    #[tokio::test]
    async fn test_generates_and_extracts() {
        let llm = Arc::new(ScriptedLlmClient::new(["```sql\nSELECT *\nFROM t;\n```"]));
        let action = GenerateSqlAction::new(llm.clone(), "SQLite");
        let r = action
            .execute(json!({
                "userQuery": "everything in t",
                "failureReason": "no such column: foo",
                "databaseSchema": "-- Table: t\nColumns: id\n"
            }))
            .await
            .unwrap();
        assert_eq!(r.as_text(), Some("SELECT * FROM t"));

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("SQLite database"));
        assert!(prompt.contains("-- Table: t"));
        assert!(prompt.contains("Previous SQL execution failed. Error: no such column: foo"));
    }

    #[tokio::test]
    async fn test_no_sql_found_is_hard_failure() {
        let llm = Arc::new(ScriptedLlmClient::new(["Sorry, I don't know."]));
        let action = GenerateSqlAction::new(llm, "SQLite");
        let err = action.execute(json!({"userQuery": "x"})).await.unwrap_err();
        assert!(matches!(err, AgentError::NoSqlFound));
    }

    #[tokio::test]
    async fn test_missing_user_query_rejected() {
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        let action = GenerateSqlAction::new(llm.clone(), "SQLite");
        let err = action.execute(json!({"sql": "SELECT 1"})).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters { .. }));
        assert_eq!(llm.call_count(), 0);
    }
}
