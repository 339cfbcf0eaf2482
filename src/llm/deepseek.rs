//! DeepSeek 端点（OpenAI 兼容协议）
//!
//! `deepseek-chat` 适合逐轮给出动作 JSON；`deepseek-reasoner` 输出较慢但 SQL 质量更高。

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 创建 DeepSeek 客户端；Key 依次取参数、`DEEPSEEK_API_KEY`、`OPENAI_API_KEY`
pub fn create_deepseek_client(model: Option<&str>, api_key: Option<&str>) -> OpenAiClient {
    let api_key = api_key
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    let model = model.unwrap_or(DEEPSEEK_CHAT);
    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), model, api_key.as_deref())
}
