//! 动作层：注册表、分发器与六个标准动作
//!
//! 每个动作接收 JSON 参数并返回 ActionResult；编排循环只通过名字调用它们。

pub mod check_query;
pub mod dispatcher;
pub mod execute_query;
pub mod generate_sql;
pub mod params;
pub mod registry;
pub mod result;
pub mod schema;
pub mod sql_extract;
pub mod summarize;
pub mod validate_request;

pub use check_query::{check_passed, CheckQueryAction, CHECK_QUERY, CHECK_QUERY_ALIAS};
pub use dispatcher::ActionDispatcher;
pub use execute_query::{ExecuteQueryAction, ExplainQueryAction, EXECUTE_QUERY, EXPLAIN_QUERY};
pub use generate_sql::{GenerateSqlAction, GENERATE_SQL};
pub use registry::{Action, ActionRegistry};
pub use result::ActionResult;
pub use schema::directive_schema_json;
pub use sql_extract::{extract_sql, normalize_sql};
pub use summarize::{SummarizeResultsAction, SUMMARIZE_RESULTS};
pub use validate_request::{ValidateUserRequestAction, VALID, VALIDATE_USER_REQUEST};

use std::sync::Arc;

use crate::backend::SqlBackend;
use crate::llm::LlmClient;

/// 注册六个标准动作及 validate_query 别名
pub fn register_canonical_actions(
    registry: &mut ActionRegistry,
    llm: Arc<dyn LlmClient>,
    backend: Arc<dyn SqlBackend>,
    validator: ValidateUserRequestAction,
) {
    registry.register(validator);
    registry.register(GenerateSqlAction::new(llm, backend.dialect()));
    registry.register(CheckQueryAction);
    registry.register(ExecuteQueryAction::new(backend.clone()));
    registry.register(ExplainQueryAction::new(backend));
    registry.register(SummarizeResultsAction);
    registry.register_alias(CHECK_QUERY_ALIAS, CHECK_QUERY);
}
