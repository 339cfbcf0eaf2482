//! 解析模型输出为动作指令
//!
//! 三种结果：合法指令、直接回答（无 JSON 或 JSON 中没有 action）、
//! 格式错误（看起来像 JSON 但解析失败，或 action / params 类型不对）。
//! 后两者都以原文作为最终回答，只有格式错误会告警。

use serde::Serialize;
use serde_json::{Map, Value};

/// 一轮的动作指令：`{"action": "...", "params": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Directive {
    pub action: String,
    pub params: Map<String, Value>,
}

impl Directive {
    pub fn new(action: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            action: action.into(),
            params,
        }
    }

    /// 字符串参数
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// 参数缺失或为 null
    pub fn lacks(&self, key: &str) -> bool {
        self.params.get(key).map_or(true, Value::is_null)
    }

    pub fn params_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    Directive(Directive),
    DirectAnswer(String),
    Malformed { raw: String, reason: String },
}

pub fn parse_directive(output: &str) -> ParsedOutput {
    let trimmed = output.trim();

    // ```json ... ``` 优先，其次第一个 '{' 到最后一个 '}'
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            return ParsedOutput::DirectAnswer(trimmed.to_string());
        }
    } else {
        return ParsedOutput::DirectAnswer(trimmed.to_string());
    };

    let value: Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(e) => {
            return ParsedOutput::Malformed {
                raw: trimmed.to_string(),
                reason: e.to_string(),
            }
        }
    };
    let Value::Object(mut obj) = value else {
        return ParsedOutput::DirectAnswer(trimmed.to_string());
    };

    let action = match obj.remove("action") {
        None => return ParsedOutput::DirectAnswer(trimmed.to_string()),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(other) => {
            return ParsedOutput::Malformed {
                raw: trimmed.to_string(),
                reason: format!("action must be a non-empty string, got {}", other),
            }
        }
    };
    let params = match obj.remove("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(p)) => p,
        Some(other) => {
            return ParsedOutput::Malformed {
                raw: trimmed.to_string(),
                reason: format!("params must be an object, got {}", other),
            }
        }
    };
    ParsedOutput::Directive(Directive { action, params })
}
