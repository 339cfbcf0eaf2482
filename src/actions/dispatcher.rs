//! 动作分发器
//!
//! 持有只读的 ActionRegistry 与单次动作超时；dispatch(name, params) 查表并执行。
//! 查不到动作返回 UnknownAction，与动作自身的执行失败区分开；每次调用输出结构化审计日志（JSON）。
//! 不做重试，也不校验 params（由动作自己负责）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::actions::{Action, ActionRegistry, ActionResult};
use crate::core::AgentError;

/// 动作分发器：对每次调用施加超时，并记录审计日志
#[derive(Clone)]
pub struct ActionDispatcher {
    registry: Arc<ActionRegistry>,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(registry: Arc<ActionRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定动作：未注册返回 UnknownAction；超时返回 ActionTimeout；
    /// 动作返回的 in-band 错误原样透传，不在此解读
    pub async fn dispatch(&self, name: &str, params: Value) -> Result<ActionResult, AgentError> {
        let action = self
            .registry
            .get(name)
            .ok_or_else(|| AgentError::UnknownAction(name.to_string()))?;

        let start = Instant::now();
        let params_preview = params_preview(&params);
        let result = timeout(self.timeout, action.execute(params)).await;

        let outcome = match &result {
            Ok(Ok(r)) if r.is_error() => "in_band_error",
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "action_audit",
            "action": action.name(),
            "requested": name,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "params_preview": params_preview,
        });
        tracing::info!(audit = %audit, "action");

        match result {
            Ok(r) => r,
            Err(_) => Err(AgentError::ActionTimeout(action.name().to_string())),
        }
    }

    /// 规范动作名（解析别名）；未注册返回 None
    pub fn canonical_name(&self, name: &str) -> Option<String> {
        self.registry.canonical_name(name).map(str::to_string)
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }
}

fn params_preview(params: &Value) -> String {
    let s = params.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Sleepy;

    #[async_trait]
    impl Action for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _params: Value) -> Result<ActionResult, AgentError> {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(ActionResult::text("late"))
        }
    }

    struct Failing;

    #[async_trait]
    impl Action for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "in-band failure"
        }

        async fn execute(&self, _params: Value) -> Result<ActionResult, AgentError> {
            Ok(ActionResult::failure("syntax error"))
        }
    }

    fn dispatcher(timeout_secs: u64) -> ActionDispatcher {
        let mut reg = ActionRegistry::new();
        reg.register(Sleepy);
        reg.register(Failing);
        ActionDispatcher::new(Arc::new(reg), timeout_secs)
    }

    #[tokio::test]
    async fn test_unknown_action_is_distinct_error() {
        let d = dispatcher(1);
        let err = d.dispatch("drop_everything", Value::Null).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownAction(ref n) if n == "drop_everything"));
    }

    #[tokio::test]
    async fn test_in_band_error_passes_through() {
        let d = dispatcher(1);
        let r = d.dispatch("failing", Value::Null).await.unwrap();
        assert_eq!(r.error_message(), Some("syntax error"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let d = dispatcher(1);
        let err = d.dispatch("sleepy", Value::Null).await.unwrap_err();
        assert!(matches!(err, AgentError::ActionTimeout(ref n) if n == "sleepy"));
    }

    #[test]
    fn test_params_preview_truncates() {
        let long = Value::String("x".repeat(500));
        assert!(params_preview(&long).ends_with("..."));
        assert_eq!(params_preview(&serde_json::json!({"sql": "SELECT 1"})), r#"{"sql":"SELECT 1"}"#);
    }
}
