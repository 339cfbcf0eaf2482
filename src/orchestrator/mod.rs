//! 编排层：指令解析、prompt、护栏、事件与主循环

pub mod directive;
pub mod events;
pub mod guardrail;
pub mod loop_;
pub mod prompt;

pub use directive::{parse_directive, Directive, ParsedOutput};
pub use events::OrchestrationEvent;
pub use guardrail::Constraint;
pub use loop_::{Orchestrator, OrchestratorSettings, RunOptions};
pub use prompt::PromptContext;
