//! 动作结果：统一的「成功载荷 | 错误描述」
//!
//! 所有动作都返回 ActionResult，编排循环据此判断终止与是否注入 failureReason，
//! 无需按动作区分错误形态。

use serde_json::{Map, Value};

/// 单个动作的执行结果（in-band，不中断循环）
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    /// 成功载荷：行列表、文本或结构化对象
    Success(Value),
    /// 预期内的失败（SQL 语法、权限、超时等），message 会回灌给模型
    Failure { error: String },
}

impl ActionResult {
    pub fn success(payload: impl Into<Value>) -> Self {
        Self::Success(payload.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Success(Value::String(text.into()))
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failure { error } => Some(error),
            Self::Success(_) => None,
        }
    }

    /// 成功且载荷为字符串时返回该字符串
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Success(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// JSON 形态：成功为载荷本身，失败为 {"error": "..."}
    pub fn to_value(&self) -> Value {
        match self {
            Self::Success(v) => v.clone(),
            Self::Failure { error } => {
                let mut obj = Map::new();
                obj.insert("error".to_string(), Value::String(error.clone()));
                Value::Object(obj)
            }
        }
    }

    /// 序列化为文本（写入 Turn、返回调用方）
    pub fn serialize(&self) -> String {
        self.to_value().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_serializes_as_error_object() {
        let r = ActionResult::failure("relation \"x\" does not exist");
        assert!(r.is_error());
        assert_eq!(r.serialize(), r#"{"error":"relation \"x\" does not exist"}"#);
    }

    #[test]
    fn test_rows_serialize_verbatim() {
        let r = ActionResult::success(json!([{"display_name": "In Progress", "id": 7}]));
        assert!(!r.is_error());
        assert_eq!(r.serialize(), r#"[{"display_name":"In Progress","id":7}]"#);
    }

    #[test]
    fn test_text_serializes_as_json_string() {
        let r = ActionResult::text("Valid");
        assert_eq!(r.as_text(), Some("Valid"));
        assert_eq!(r.serialize(), "\"Valid\"");
        assert_eq!(r.error_message(), None);
    }
}
