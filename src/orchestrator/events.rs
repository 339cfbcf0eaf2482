//! 编排过程事件：供 CLI / 前端展示每一轮的进展

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    RoundStarted { round: usize, max_rounds: usize },
    /// 模型给出的指令（护栏改写前）
    DirectiveParsed {
        round: usize,
        action: String,
        params: Value,
    },
    GuardrailApplied {
        round: usize,
        guardrail: String,
        requested: String,
        enforced: String,
    },
    ActionDispatched {
        round: usize,
        action: String,
        is_error: bool,
        /// 结果预览
        preview: String,
    },
    /// 输出像 JSON 但无法解析，按直接回答处理
    MalformedDirective { round: usize, reason: String },
    Finished { rounds: usize, answer_preview: String },
    Error { text: String },
}
