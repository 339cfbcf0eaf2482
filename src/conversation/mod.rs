//! 会话状态：轮次历史与持久化

pub mod model;
pub mod store;

pub use model::{Conversation, NewTurn, Turn, ANONYMOUS_USER};
pub use store::{ConversationStore, InMemoryConversationStore, SqliteConversationStore};
