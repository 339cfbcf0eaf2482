//! 动作指令 JSON Schema（schemars 生成）
//!
//! 拼入 system prompt，约束模型输出 `{"action": "...", "params": {...}}`。

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

/// 指令格式，仅用于 Schema 生成
#[allow(dead_code)]
#[derive(JsonSchema)]
struct DirectiveFormat {
    /// 动作名，如 validate_user_request、generate_sql、check_query、execute_query
    pub action: String,
    /// 动作参数，字段因动作而异（userQuery、sql、failureReason 等）
    pub params: Map<String, Value>,
}

pub fn directive_schema_json() -> String {
    let schema = schema_for!(DirectiveFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_names_fields() {
        let s = directive_schema_json();
        assert!(s.contains("\"action\""));
        assert!(s.contains("\"params\""));
    }
}
