//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）

pub mod gemini;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use gemini::{create_gemini_client, GEMINI_BASE_URL, GEMINI_FLASH};
pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use traits::LlmClient;

use crate::config::AppConfig;

/// 从 LLM 输出中提取 JSON 块：优先 ```json ... ```，否则取首个 `{` 到最后一个 `}`
pub fn extract_json_block(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 根据配置与环境变量选择 LLM 后端（Gemini / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_gemini_key =
        std::env::var("GEMINI_API_KEY").is_ok() || std::env::var("GOOGLE_API_KEY").is_ok();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();

    if provider == "gemini" && has_gemini_key {
        tracing::info!("Using Gemini LLM ({})", cfg.llm.model);
        Arc::new(create_gemini_client(
            Some(&cfg.llm.model),
            cfg.llm.base_url.as_deref(),
        ))
    } else if provider == "openai" && has_openai_key {
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced_json() {
        let out = "Here is the plan:\n```json\n{\"steps\": [\"a\"]}\n```\nDone.";
        assert_eq!(extract_json_block(out), Some("{\"steps\": [\"a\"]}"));
    }

    #[test]
    fn test_extract_bare_json() {
        assert_eq!(extract_json_block("ok {\"a\": {\"b\": 1}} trailing"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_block("no json here"), None);
        assert_eq!(extract_json_block("} {"), None);
    }
}
