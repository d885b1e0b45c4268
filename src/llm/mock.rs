//! Mock LLM 客户端（用于测试与无 Key 场景，无需 API）
//!
//! 取最后一条 User 消息，回复一个同时满足规划器与浏览器执行器解析的 JSON：
//! `steps` 为单步清单（原样回显用户输入），`action` 为 done，便于本地跑通整条流程。

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(serde_json::json!({
            "steps": [format!("Echo from Mock: {}", last_user)],
            "thought": "Mock client has nothing to do",
            "action": "done",
        })
        .to_string())
    }
}
