//! 编排错误类型
//!
//! 只有「中断本轮」的错误才走 AgentError；SQL 执行失败等预期内的失败以
//! ActionResult::Failure 形式留在数据里，交给模型决定下一步。

use thiserror::Error;

/// 编排过程中会中断整个 run 的错误（动作未注册、参数非法、无 SQL、协作方失败等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid parameters for {action}: {reason}")]
    InvalidParameters { action: String, reason: String },

    #[error("No SQL query found in LLM response")]
    NoSqlFound,

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("LLM call timed out after {0}s")]
    LlmTimeout(u64),

    #[error("Orchestration timed out after {0}s")]
    RunTimeout(u64),

    #[error("Action timeout: {0}")]
    ActionTimeout(String),

    #[error("Conversation store error: {0}")]
    Store(String),

    #[error("Database backend error: {0}")]
    Backend(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn invalid_params(action: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            action: action.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_user_facing() {
        let err = AgentError::UnknownAction("drop_table".to_string());
        assert_eq!(format!("Error: {}", err), "Error: Unknown action: drop_table");

        let err = AgentError::invalid_params("explain_query", "missing field `sql`");
        assert_eq!(
            err.to_string(),
            "Invalid parameters for explain_query: missing field `sql`"
        );
    }
}
