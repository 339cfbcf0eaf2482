//! 核心层：错误类型、编排器装配、按会话加锁

pub mod builder;
pub mod error;
pub mod locks;

pub use builder::{create_llm_from_config, create_store_from_config, OrchestratorBuilder};
pub use error::AgentError;
pub use locks::ConversationLocks;
