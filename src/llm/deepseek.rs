//! DeepSeek 后端：伴聊各任务的默认生成能力
//!
//! 走 OpenAI 兼容协议，复用 OpenAiClient。`[llm] base_url` / `model` 可覆盖默认端点与模型，
//! Key 取 `DEEPSEEK_API_KEY`，没有时退回 `OPENAI_API_KEY`。

use crate::config::LlmSection;
use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

fn api_key() -> Option<String> {
    std::env::var("DEEPSEEK_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok()
}

/// 模型优先级：配置 > `DEEPSEEK_MODEL` > deepseek-chat
pub fn create_deepseek_client(cfg: &LlmSection) -> OpenAiClient {
    let model = cfg
        .model
        .clone()
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());
    let base_url = cfg.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);
    OpenAiClient::new(Some(base_url), &model, api_key().as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_model_wins() {
        let cfg = LlmSection {
            model: Some("deepseek-reasoner".to_string()),
            ..LlmSection::default()
        };
        assert_eq!(create_deepseek_client(&cfg).model(), "deepseek-reasoner");
    }
}
