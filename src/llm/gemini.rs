//! Gemini 客户端（走 Generative Language 的 OpenAI 兼容端点）
//!
//! - Base URL: https://generativelanguage.googleapis.com/v1beta/openai
//! - 模型: gemini-2.5-flash（默认）、gemini-2.0-flash 等

use crate::llm::OpenAiClient;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const GEMINI_FLASH: &str = "gemini-2.5-flash";

/// 创建 Gemini 客户端
///
/// - 优先使用环境变量 `GEMINI_API_KEY`，其次 `GOOGLE_API_KEY`
/// - base_url 为空时使用官方 OpenAI 兼容端点
pub fn create_gemini_client(model: Option<&str>, base_url: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("GEMINI_API_KEY")
        .ok()
        .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
        .unwrap_or_default();

    let model = model.unwrap_or(GEMINI_FLASH);
    let base = base_url.unwrap_or(GEMINI_BASE_URL).trim_end_matches('/');

    OpenAiClient::new(Some(base), model, Some(api_key.as_str()))
}
