//! 动作注册表
//!
//! 所有动作实现 Action trait（name / description / execute），由 ActionRegistry 按名注册与查找。
//! 注册表在启动时构建一次，之后只读（以 Arc 共享给 Dispatcher）。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::actions::ActionResult;
use crate::core::AgentError;

/// 动作 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（params 为 JSON）
///
/// 预期内的失败用 `Ok(ActionResult::Failure)` 表达；`Err` 只用于需要中断本轮的情况
/// （参数非法、提取不到 SQL、LLM 不可用）。
#[async_trait]
pub trait Action: Send + Sync {
    /// 动作名称（对应 directive 中的 "action" 字段）
    fn name(&self) -> &str;

    /// 动作描述
    fn description(&self) -> &str;

    /// 参数 JSON Schema（拼入 prompt 的动作菜单）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, params: Value) -> Result<ActionResult, AgentError>;
}

/// 动作注册表：名称 -> Arc<dyn Action>；同名重复注册时后者覆盖前者
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
    /// 别名 -> 规范名（如 validate_query -> check_query）
    aliases: HashMap<String, String>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: impl Action + 'static) {
        self.register_arc(Arc::new(action));
    }

    pub fn register_arc(&mut self, action: Arc<dyn Action>) {
        let name = action.name().to_string();
        self.aliases.remove(&name);
        if self.actions.insert(name.clone(), action).is_some() {
            tracing::debug!(action = %name, "action re-registered, previous entry replaced");
        }
    }

    /// 为已注册（或稍后注册）的动作添加别名；别名不会遮盖同名的真实动作
    pub fn register_alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.aliases.insert(alias.into(), target.into());
    }

    /// 解析为规范名：真实动作优先，其次别名
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.actions.contains_key(name) {
            return Some(name);
        }
        let target = self.aliases.get(name)?;
        self.actions.contains_key(target).then_some(target.as_str())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        let canonical = self.canonical_name(name)?;
        self.actions.get(canonical).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.canonical_name(name).is_some()
    }

    /// 已注册动作名（排序，保证 prompt 稳定）
    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// 动作及其参数 schema 的 JSON 数组
    pub fn to_schema_json(&self) -> String {
        let actions: Vec<Value> = self
            .action_names()
            .iter()
            .filter_map(|name| self.actions.get(name))
            .map(|action| {
                serde_json::json!({
                    "name": action.name(),
                    "description": action.description(),
                    "parameters": action.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&actions).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl Action for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "fixed reply"
        }

        async fn execute(&self, _params: Value) -> Result<ActionResult, AgentError> {
            Ok(ActionResult::text(self.reply))
        }
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut reg = ActionRegistry::new();
        reg.register(Fixed { name: "ping", reply: "one" });
        reg.register(Fixed { name: "ping", reply: "two" });
        assert_eq!(reg.len(), 1);
        let out = reg.get("ping").unwrap().execute(Value::Null).await.unwrap();
        assert_eq!(out.as_text(), Some("two"));
    }

    #[test]
    fn test_alias_resolution() {
        let mut reg = ActionRegistry::new();
        reg.register(Fixed { name: "check_query", reply: "ok" });
        reg.register_alias("validate_query", "check_query");
        reg.register_alias("dangling", "missing");
        assert_eq!(reg.canonical_name("validate_query"), Some("check_query"));
        assert_eq!(reg.canonical_name("check_query"), Some("check_query"));
        assert!(reg.get("dangling").is_none());
        assert!(!reg.contains("nope"));
        // 别名不进入动作菜单
        assert_eq!(reg.action_names(), vec!["check_query".to_string()]);
    }

    #[test]
    fn test_real_action_shadows_alias() {
        let mut reg = ActionRegistry::new();
        reg.register(Fixed { name: "a", reply: "a" });
        reg.register_alias("b", "a");
        reg.register(Fixed { name: "b", reply: "b" });
        assert_eq!(reg.canonical_name("b"), Some("b"));
    }

    #[test]
    fn test_schema_json_lists_sorted_actions() {
        let mut reg = ActionRegistry::new();
        reg.register(Fixed { name: "zeta", reply: "" });
        reg.register(Fixed { name: "alpha", reply: "" });
        let schema: Value = serde_json::from_str(&reg.to_schema_json()).unwrap();
        assert_eq!(schema[0]["name"], "alpha");
        assert_eq!(schema[1]["name"], "zeta");
    }
}
