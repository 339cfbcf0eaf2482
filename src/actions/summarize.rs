//! summarize_results：对结果集给出简短摘要

use async_trait::async_trait;
use serde_json::Value;

use crate::actions::params::{parse_params, SummarizeParams};
use crate::actions::{Action, ActionResult};
use crate::core::AgentError;

pub const SUMMARIZE_RESULTS: &str = "summarize_results";

const NO_RESULTS: &str = "No results to summarize.";

pub struct SummarizeResultsAction;

/// 行数组 -> "Rows: n, Columns: m"（列数取第一行）
pub fn summarize(results: Option<&Value>) -> Result<String, String> {
    let owned;
    let value = match results {
        None | Some(Value::Null) => return Ok(NO_RESULTS.to_string()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(NO_RESULTS.to_string()),
        Some(Value::String(s)) => {
            owned = serde_json::from_str::<Value>(s)
                .map_err(|e| format!("results is not valid JSON: {}", e))?;
            &owned
        }
        Some(v) => v,
    };
    let rows = value
        .as_array()
        .ok_or_else(|| "results must be an array of rows".to_string())?;
    if rows.is_empty() {
        return Ok(NO_RESULTS.to_string());
    }
    let columns = rows[0].as_object().map(|o| o.len()).unwrap_or(0);
    Ok(format!("Rows: {}, Columns: {}", rows.len(), columns))
}

#[async_trait]
impl Action for SummarizeResultsAction {
    fn name(&self) -> &str {
        SUMMARIZE_RESULTS
    }

    fn description(&self) -> &str {
        "Summarize query results (row and column counts)."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "results": {
                    "description": "Rows returned by execute_query, as an array or a JSON string"
                }
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<ActionResult, AgentError> {
        let p: SummarizeParams = parse_params(SUMMARIZE_RESULTS, params)?;
        Ok(match summarize(p.results.as_ref()) {
            Ok(text) => ActionResult::text(text),
            Err(e) => ActionResult::failure(e),
        })
    }
}
