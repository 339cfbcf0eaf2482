//! validate_user_request：判断用户问题是否可执行
//!
//! 永不失败：总是返回 "Valid" 或以 "Invalid:" 开头的具体原因。

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;

use crate::actions::params::{parse_params, UserRequestParams};
use crate::actions::{Action, ActionResult};
use crate::core::AgentError;

pub const VALIDATE_USER_REQUEST: &str = "validate_user_request";
pub const VALID: &str = "Valid";

/// 用户请求校验：空、过短、与库结构无关
pub struct ValidateUserRequestAction {
    min_chars: usize,
    /// 表名 / 列名拆出的小写词；为空时不做相关性检查
    vocabulary: HashSet<String>,
    require_relevance: bool,
}

impl ValidateUserRequestAction {
    pub fn new(min_chars: usize) -> Self {
        Self {
            min_chars,
            vocabulary: HashSet::new(),
            require_relevance: false,
        }
    }

    /// 以表名、列名构建词表（work_order_status -> work / order / status）
    pub fn with_schema_vocabulary<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref().to_lowercase();
            self.vocabulary.extend(words(&name).map(str::to_string));
            self.vocabulary.insert(name);
        }
        self.require_relevance = !self.vocabulary.is_empty();
        self
    }

    pub fn with_require_relevance(mut self, require: bool) -> Self {
        self.require_relevance = require && !self.vocabulary.is_empty();
        self
    }

    pub fn validate(&self, query: &str) -> String {
        let query = query.trim();
        if query.is_empty() {
            return "Invalid: Query is empty.".to_string();
        }
        if query.chars().count() < self.min_chars {
            return "Invalid: Query is too short.".to_string();
        }
        if self.require_relevance && !self.is_schema_relevant(query) {
            return "Invalid: Query does not relate to the database schema.".to_string();
        }
        VALID.to_string()
    }

    fn is_schema_relevant(&self, query: &str) -> bool {
        let lower = query.to_lowercase();
        let hit = words(&lower).any(|w| {
            self.vocabulary.contains(w)
                || w.strip_suffix('s').is_some_and(|s| self.vocabulary.contains(s))
        });
        hit
    }
}

/// 切分为长度 >= 3 的词（下划线与标点都算分隔符）
fn words(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
}

#[async_trait]
impl Action for ValidateUserRequestAction {
    fn name(&self) -> &str {
        VALIDATE_USER_REQUEST
    }

    fn description(&self) -> &str {
        "Check if the user query is actionable. Returns \"Valid\" or the reason it is not."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "userQuery": { "type": "string", "description": "The user's question, verbatim" }
            },
            "required": ["userQuery"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ActionResult, AgentError> {
        let text = match parse_params::<UserRequestParams>(VALIDATE_USER_REQUEST, params) {
            Ok(p) => self.validate(p.user_query.as_deref().unwrap_or("")),
            Err(e) => format!("Invalid: {}", e),
        };
        Ok(ActionResult::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_schema() -> ValidateUserRequestAction {
        ValidateUserRequestAction::new(3).with_schema_vocabulary([
            "work_order",
            "work_order_status",
            "display_name",
        ])
    }

    #[test]
    fn test_empty_and_whitespace() {
        let v = ValidateUserRequestAction::new(3);
        assert_eq!(v.validate(""), "Invalid: Query is empty.");
        assert_eq!(v.validate("   \n\t"), "Invalid: Query is empty.");
    }

    #[test]
    fn test_too_short() {
        let v = ValidateUserRequestAction::new(3);
        assert_eq!(v.validate("hi"), "Invalid: Query is too short.");
        assert_eq!(v.validate("how many?"), VALID);
    }

    #[test]
    fn test_schema_relevance() {
        let v = with_schema();
        assert_eq!(v.validate("What is the status of work order WO-123?"), VALID);
        assert_eq!(v.validate("list all orders"), VALID);
        assert_eq!(
            v.validate("tell me a joke about cats"),
            "Invalid: Query does not relate to the database schema."
        );
        let lenient = with_schema().with_require_relevance(false);
        assert_eq!(lenient.validate("tell me a joke about cats"), VALID);
    }

    #[tokio::test]
    async fn test_execute_never_fails() {
        let v = ValidateUserRequestAction::new(3);
        let r = v.execute(json!({"userQuery": "  "})).await.unwrap();
        assert_eq!(r.as_text(), Some("Invalid: Query is empty."));
        let r = v.execute(Value::Null).await.unwrap();
        assert_eq!(r.as_text(), Some("Invalid: Query is empty."));
        let r = v.execute(json!({"userQuery": 12})).await.unwrap();
        assert!(r.as_text().unwrap().starts_with("Invalid:"));
    }
}
