//! AskDB - 自然语言数据库问答的编排引擎
//!
//! 模块划分：
//! - **actions**: 动作 trait、注册表、分发器与六个标准动作
//! - **backend**: SQL 执行后端（SQLite，只读）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **context**: 库结构内省与检索
//! - **conversation**: 会话 / 轮次模型与存储
//! - **core**: 错误类型、编排器装配、按会话加锁
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: 日志初始化
//! - **orchestrator**: 指令解析、prompt、护栏与主循环

pub mod actions;
pub mod backend;
pub mod config;
pub mod context;
pub mod conversation;
pub mod core;
pub mod llm;
pub mod observability;
pub mod orchestrator;

pub use crate::core::{AgentError, OrchestratorBuilder};
pub use orchestrator::{Orchestrator, OrchestrationEvent, RunOptions};
