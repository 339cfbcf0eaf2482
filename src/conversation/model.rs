//! 会话与轮次
//!
//! Turn 只追加、不修改；序号在追加时按当前轮数重新计算（len + 1）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ANONYMOUS_USER: &str = "anonymous";

/// 一次完成的交换：用户问题 + 本轮动作结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// 从 1 开始，会话内单调递增
    pub turn: u32,
    pub user_query: String,
    /// 序列化后的动作结果（写入 previousContext 的 AI 部分）
    pub response: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_result: Option<String>,
}

/// 追加前的轮次内容（序号与时间戳由 append_turn 填写）
#[derive(Debug, Clone, Default)]
pub struct NewTurn {
    pub user_query: String,
    pub response: String,
    pub generated_sql: Option<String>,
    pub raw_result: Option<String>,
}

impl NewTurn {
    pub fn new(user_query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            response: response.into(),
            ..Default::default()
        }
    }

    pub fn with_sql(mut self, sql: Option<String>) -> Self {
        self.generated_sql = sql;
        self
    }

    pub fn with_raw_result(mut self, raw: Option<String>) -> Self {
        self.raw_result = raw;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

impl Conversation {
    /// 新会话：所有者为 anonymous，无轮次
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: ANONYMOUS_USER.to_string(),
            created_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    /// 从存储恢复（按 turn 排序）
    pub fn restore(
        id: impl Into<String>,
        user_id: impl Into<String>,
        created_at: DateTime<Utc>,
        mut turns: Vec<Turn>,
    ) -> Self {
        turns.sort_by_key(|t| t.turn);
        Self {
            id: id.into(),
            user_id: user_id.into(),
            created_at,
            turns,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 追加一轮，返回其序号
    pub fn append_turn(&mut self, new: NewTurn) -> u32 {
        let seq = self.turns.len() as u32 + 1;
        self.turns.push(Turn {
            turn: seq,
            user_query: new.user_query,
            response: new.response,
            timestamp: Utc::now(),
            generated_sql: new.generated_sql,
            raw_result: new.raw_result,
        });
        seq
    }

    /// "User: <q>\nAI: <r>"，按轮次顺序以换行连接
    pub fn previous_context(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("User: {}\nAI: {}", t.user_query, t.response))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_conversation_is_anonymous_and_empty() {
        let c = Conversation::new("abc");
        assert_eq!(c.user_id, ANONYMOUS_USER);
        assert!(c.is_empty());
        assert_eq!(c.previous_context(), "");
    }

    #[test]
    fn test_append_numbers_and_context() {
        let mut c = Conversation::new("abc");
        assert_eq!(c.append_turn(NewTurn::new("q1", "\"Valid\"")), 1);
        assert_eq!(
            c.append_turn(NewTurn::new("q1", "\"SELECT 1\"").with_sql(Some("SELECT 1".into()))),
            2
        );
        assert_eq!(c.turns()[1].generated_sql.as_deref(), Some("SELECT 1"));
        assert_eq!(
            c.previous_context(),
            "User: q1\nAI: \"Valid\"\nUser: q1\nAI: \"SELECT 1\""
        );
    }

    #[test]
    fn test_restore_orders_turns() {
        let mut c = Conversation::new("x");
        c.append_turn(NewTurn::new("a", "1"));
        c.append_turn(NewTurn::new("b", "2"));
        let mut turns = c.turns().to_vec();
        turns.reverse();
        let restored = Conversation::restore("x", "anonymous", c.created_at, turns);
        assert_eq!(restored, c);
        let mut restored = restored;
        assert_eq!(restored.append_turn(NewTurn::new("c", "3")), 3);
    }
}
