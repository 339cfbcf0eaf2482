//! 各动作的类型化参数
//!
//! LLM 给出的 params 是任意 JSON；在动作边界反序列化为小结构体，
//! 缺少必填字段、类型不符或出现未知字段时返回 InvalidParameters。

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::AgentError;

/// validate_user_request 参数（宽松：缺失视为空查询）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequestParams {
    #[serde(default)]
    pub user_query: Option<String>,
}

/// generate_sql 参数
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GenerateSqlParams {
    pub user_query: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub database_schema: Option<String>,
    #[serde(default)]
    pub rag_context: Option<String>,
    #[serde(default)]
    pub previous_context: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// execute_query / explain_query 参数
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlParams {
    pub sql: String,
}

/// check_query 参数（宽松：缺失视为空 SQL）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckSqlParams {
    #[serde(default)]
    pub sql: Option<String>,
}

/// summarize_results 参数：行数组，或编码了行数组的 JSON 字符串
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummarizeParams {
    #[serde(default)]
    pub results: Option<Value>,
}

/// 将 params 解析为 T；null 视为空对象
pub fn parse_params<T: DeserializeOwned>(action: &str, params: Value) -> Result<T, AgentError> {
    let params = match params {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| AgentError::invalid_params(action, e.to_string()))
}
