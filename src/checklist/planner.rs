//! 清单规划器
//!
//! 两阶段调用 LLM：先为「任务 + 站点」生成粗粒度步骤，再改写为每步恰好一个浏览器原语
//! （打开 URL / 点击 / 排序 / 筛选 / 翻页 / 关闭页面）。两次输出都必须是 `{"steps": [...]}`。
//! 任何格式问题都映射为 AgentError::Planning，整次运行就此中止。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::checklist::{Checklist, Task};
use crate::core::AgentError;
use crate::llm::{extract_json_block, LlmClient, Message};

const PLAN_SYSTEM_PROMPT: &str = "You are a planning assistant for a web-automation agent. \
Always answer with a single JSON object of the form {\"steps\": [\"...\", \"...\"]} and nothing else.";

/// 外部规划服务：为任务生成非空、有序的清单
#[async_trait]
pub trait ChecklistPlanner: Send + Sync {
    async fn plan(&self, task: &Task) -> Result<Checklist, AgentError>;
}

#[derive(Debug, Deserialize)]
struct PlanPayload {
    steps: Vec<serde_json::Value>,
}

/// 解析 `{"steps": [...]}`：非 JSON、非字符串项、空白项、空清单都视为规划失败
pub fn parse_plan(output: &str) -> Result<Checklist, AgentError> {
    let json = extract_json_block(output)
        .ok_or_else(|| AgentError::Planning(format!("no JSON object in planner output: {}", output)))?;

    let payload: PlanPayload = serde_json::from_str(json)
        .map_err(|e| AgentError::Planning(format!("{}: {}", e, json)))?;

    let steps = payload
        .steps
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => Ok(s),
            other => Err(AgentError::Planning(format!(
                "planner must return a list of strings, got {}",
                other
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Checklist::new(steps)
        .ok_or_else(|| AgentError::Planning("planner returned an empty or blank step".to_string()))
}

/// 基于 LLM 的两阶段规划器
pub struct LlmChecklistPlanner {
    llm: Arc<dyn LlmClient>,
}

impl LlmChecklistPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    async fn ask(&self, prompt: String) -> Result<Checklist, AgentError> {
        let output = self
            .llm
            .complete(&[Message::system(PLAN_SYSTEM_PROMPT), Message::user(prompt)])
            .await
            .map_err(|e| AgentError::Planning(format!("planning service failed: {}", e)))?;
        parse_plan(&output)
    }
}

fn draft_prompt(task: &Task) -> String {
    let full_task = format!("{}. Website: {}", task.description.trim(), task.website.trim());
    format!(
        "For the given task {}, produce a concise, step-by-step plan that a web-automation agent \
could follow to obtain the final answer from the specified website. Each step must be explicit, \
self-contained and necessary. The last step must yield the answer.",
        full_task
    )
}

fn refine_prompt(draft: &Checklist) -> String {
    let plan = serde_json::to_string(draft.steps()).unwrap_or_default();
    format!(
        "You are given an initial plan: {}\n\n\
Rewrite it so that every step corresponds to exactly one of these primitive browser actions:\n\
1. open a URL\n\
2. click an element\n\
3. sort results\n\
4. filter results\n\
5. change page\n\
6. close page\n\n\
Each step must include all information required to perform the action. \
Return the improved plan in the same JSON schema.",
        plan
    )
}

#[async_trait]
impl ChecklistPlanner for LlmChecklistPlanner {
    async fn plan(&self, task: &Task) -> Result<Checklist, AgentError> {
        let draft = self.ask(draft_prompt(task)).await?;
        tracing::debug!(steps = draft.len(), "draft plan received");

        let refined = self.ask(refine_prompt(&draft)).await?;
        tracing::info!(steps = refined.len(), "checklist planned");
        Ok(refined)
    }
}
