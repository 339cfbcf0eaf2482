//! 脚本化 Mock LLM（测试与无 Key 本地运行用）
//!
//! 按顺序返回预设回复，并记录每次收到的 prompt，便于断言提示词内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

/// 脚本耗尽后的行为
#[derive(Debug, Clone)]
enum Exhausted {
    /// 返回固定文本
    Reply(String),
    /// 返回错误（模拟 LLM 不可用）
    Fail,
}

/// 按脚本依次回复的 LLM
#[derive(Debug)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    exhausted: Exhausted,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            exhausted: Exhausted::Fail,
        }
    }

    /// 脚本耗尽后一直返回 reply（用于测试轮数上限）
    pub fn repeating(mut self, reply: impl Into<String>) -> Self {
        self.exhausted = Exhausted::Reply(reply.into());
        self
    }

    /// 已收到的全部 prompt（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl Default for ScriptedLlmClient {
    /// 无 API Key 时的本地兜底：直接回答，不调用任何动作
    fn default() -> Self {
        Self::new(Vec::<String>::new())
            .repeating("No LLM backend is configured; set DEEPSEEK_API_KEY or OPENAI_API_KEY.")
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt);
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| "mock poisoned".to_string())?
            .pop_front();
        match (next, &self.exhausted) {
            (Some(reply), _) => Ok(reply),
            (None, Exhausted::Reply(reply)) => Ok(reply.clone()),
            (None, Exhausted::Fail) => Err("scripted LLM exhausted".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_then_fails() {
        let llm = ScriptedLlmClient::new(["a", "b"]);
        assert_eq!(llm.generate("p1").await.unwrap(), "a");
        assert_eq!(llm.generate("p2").await.unwrap(), "b");
        assert!(llm.generate("p3").await.is_err());
        assert_eq!(llm.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_repeating_after_script() {
        let llm = ScriptedLlmClient::new(["first"]).repeating("again");
        assert_eq!(llm.generate("x").await.unwrap(), "first");
        assert_eq!(llm.generate("y").await.unwrap(), "again");
        assert_eq!(llm.generate("z").await.unwrap(), "again");
        assert_eq!(llm.call_count(), 3);
    }
}
