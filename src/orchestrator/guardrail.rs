//! 护栏：收窄下一轮允许的指令
//!
//! - Opening：第一轮只能 validate_user_request；
//! - ExecuteChecked：check_query 通过后，下一轮必须 execute_query 同一条 SQL。
//!
//! 约束既写进 prompt，也在分发前以程序方式强制（enforce_guardrails）。

use serde_json::{Map, Value};

use crate::actions::{normalize_sql, EXECUTE_QUERY, VALIDATE_USER_REQUEST};
use crate::orchestrator::Directive;

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Opening { user_query: String },
    ExecuteChecked { sql: String },
}

impl Constraint {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Opening { .. } => "opening_validation",
            Self::ExecuteChecked { .. } => "execute_checked_sql",
        }
    }

    /// 唯一允许的指令
    pub fn required_directive(&self) -> Directive {
        let mut params = Map::new();
        match self {
            Self::Opening { user_query } => {
                params.insert("userQuery".to_string(), Value::String(user_query.clone()));
                Directive::new(VALIDATE_USER_REQUEST, params)
            }
            Self::ExecuteChecked { sql } => {
                params.insert("sql".to_string(), Value::String(sql.clone()));
                Directive::new(EXECUTE_QUERY, params)
            }
        }
    }

    fn permits(&self, directive: &Directive) -> bool {
        match self {
            // 只放行原问题本身，模型改写过的问题一律换回原文
            Self::Opening { user_query } => {
                directive.action == VALIDATE_USER_REQUEST
                    && directive.params.len() == 1
                    && directive.param_str("userQuery") == Some(user_query.as_str())
            }
            Self::ExecuteChecked { sql } => {
                directive.action == EXECUTE_QUERY
                    && directive.params.len() == 1
                    && directive
                        .param_str("sql")
                        .is_some_and(|s| normalize_sql(s) == normalize_sql(sql))
            }
        }
    }

    /// 放行或改写；第二个返回值表示是否改写
    pub fn apply(&self, directive: Directive) -> (Directive, bool) {
        if self.permits(&directive) {
            (directive, false)
        } else {
            (self.required_directive(), true)
        }
    }

    /// 写入 prompt 的硬约束
    pub fn prompt_instruction(&self) -> String {
        let required = self.required_directive();
        format!(
            "MANDATORY NEXT ACTION: respond with exactly this JSON and nothing else:\n{}",
            serde_json::json!({ "action": required.action, "params": required.params_value() })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn directive(action: &str, params: Value) -> Directive {
        Directive::new(action, params.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_opening_overrides_sql_actions() {
        let c = Constraint::Opening {
            user_query: "status of WO-123".to_string(),
        };
        let (d, overridden) = c.apply(directive("generate_sql", json!({"userQuery": "x"})));
        assert!(overridden);
        assert_eq!(d.action, VALIDATE_USER_REQUEST);
        assert_eq!(d.param_str("userQuery"), Some("status of WO-123"));

        let keep = directive(VALIDATE_USER_REQUEST, json!({"userQuery": "status of WO-123"}));
        assert_eq!(c.apply(keep.clone()), (keep, false));
    }

    #[test]
    fn test_opening_pins_original_query() {
        let c = Constraint::Opening {
            user_query: "   ".to_string(),
        };
        for other in [
            directive(VALIDATE_USER_REQUEST, json!({"userQuery": "list work order status"})),
            directive(VALIDATE_USER_REQUEST, json!({})),
            directive(VALIDATE_USER_REQUEST, json!({"userQuery": "   ", "extra": 1})),
        ] {
            let (d, overridden) = c.apply(other);
            assert!(overridden);
            assert_eq!(d.param_str("userQuery"), Some("   "));
            assert_eq!(d.params.len(), 1);
        }
    }

    #[test]
    fn test_execute_checked() {
        let c = Constraint::ExecuteChecked {
            sql: "SELECT * FROM t".to_string(),
        };
        // 仅空白差异视为同一条
        let same = directive(EXECUTE_QUERY, json!({"sql": "SELECT *\n  FROM t;"}));
        assert!(!c.apply(same).1);

        for other in [
            directive("generate_sql", json!({"userQuery": "x"})),
            directive(EXECUTE_QUERY, json!({"sql": "SELECT id FROM t"})),
            directive(EXECUTE_QUERY, json!({})),
        ] {
            let (d, overridden) = c.apply(other);
            assert!(overridden);
            assert_eq!(d.action, EXECUTE_QUERY);
            assert_eq!(d.param_str("sql"), Some("SELECT * FROM t"));
        }
    }

    #[test]
    fn test_prompt_instruction_names_sql() {
        let c = Constraint::ExecuteChecked {
            sql: "SELECT 1".to_string(),
        };
        let text = c.prompt_instruction();
        assert!(text.contains(r#""action":"execute_query""#));
        assert!(text.contains(r#""sql":"SELECT 1""#));
    }
}
