//! LLM 客户端抽象
//!
//! 编排层只把模型当作黑盒：输入 prompt 文本，输出任意文本（不保证结构）。
//! 后端（OpenAI 兼容 / DeepSeek / 脚本化 Mock）实现 LlmClient::complete。

use async_trait::async_trait;

use crate::llm::Message;

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 单条 prompt 的便捷入口：包装为一条 User 消息后调用 complete
    async fn generate(&self, prompt: &str) -> Result<String, String> {
        self.complete(&[Message::user(prompt)]).await
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
