//! OpenAI 兼容 API 客户端
//!
//! 规划器与浏览器执行器共用；Gemini 也走这里（OpenAI 兼容端点）。
//! 调用失败按指数退避重试，重试耗尽后把最后一次错误文本交给调用方。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

const DEFAULT_MAX_RETRIES: u32 = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

fn to_request_message(m: &Message) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = m.content.clone();
    Ok(match m.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_retries: u32,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl OpenAiClient {
    /// api_key 为空时读 OPENAI_API_KEY；base_url 为空时用官方端点
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url.trim_end_matches('/'));
        }

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature: 0.0,
            max_retries: DEFAULT_MAX_RETRIES,
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_once(&self, messages: &[Message]) -> Result<String, OpenAIError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(
                messages
                    .iter()
                    .map(to_request_message)
                    .collect::<Result<Vec<_>, _>>()?,
            )
            .build()?;

        let response = self.client.chat().create(request).await?;

        if let Some(usage) = &response.usage {
            self.prompt_tokens
                .fetch_add(usage.prompt_tokens as u64, Ordering::Relaxed);
            self.completion_tokens
                .fetch_add(usage.completion_tokens as u64, Ordering::Relaxed);
        }

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let mut attempt = 0;
        loop {
            match self.complete_once(messages).await {
                Ok(content) => return Ok(content),
                // 请求本身构造失败，重试无意义
                Err(e @ OpenAIError::InvalidArgument(_)) => return Err(e.to_string()),
                Err(e) if attempt < self.max_retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    attempt += 1;
                    tracing::warn!(
                        model = %self.model,
                        attempt,
                        "LLM call failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.to_string()),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        let prompt = self.prompt_tokens.load(Ordering::Relaxed);
        let completion = self.completion_tokens.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_roles_map_to_request_variants() {
        let sys = to_request_message(&Message::system("plan")).unwrap();
        let user = to_request_message(&Message::user("task")).unwrap();
        let asst = to_request_message(&Message::assistant("{}")).unwrap();
        assert!(matches!(sys, ChatCompletionRequestMessage::System(_)));
        assert!(matches!(user, ChatCompletionRequestMessage::User(_)));
        assert!(matches!(asst, ChatCompletionRequestMessage::Assistant(_)));
    }

    #[test]
    fn test_new_client_starts_with_zero_usage() {
        let client = OpenAiClient::new(Some("http://localhost:1/v1/"), "gpt-4o-mini", Some("sk-test"))
            .with_max_retries(0);
        assert_eq!(client.model(), "gpt-4o-mini");
        assert_eq!(client.token_usage(), (0, 0, 0));
    }
}
