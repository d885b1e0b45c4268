//! Step executor 边界
//!
//! 执行器负责把一条原子指令驱动到完成（内部决策循环、视觉 / DOM 处理都不在本层），
//! 返回逐步历史。编排器只复制这些记录进总轨迹，从不修改其内容。

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::browser::{BrowserSession, TabHandle};

/// 截图引用：磁盘路径或 base64 编码的图片字节
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ScreenshotRef {
    Path(PathBuf),
    Base64(String),
}

/// 单个动作的结果
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub is_done: bool,
    pub error: Option<String>,
    /// done 动作携带的结论文本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn done() -> Self {
        Self::done_with(None)
    }

    pub fn done_with(content: Option<String>) -> Self {
        Self {
            is_done: true,
            error: None,
            extracted_content: content,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            is_done: false,
            error: Some(error.into()),
            extracted_content: None,
        }
    }
}

/// 执行器的一步：截图、模型输出、动作结果列表
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub screenshot: Option<ScreenshotRef>,
    pub model_output: Option<String>,
    pub results: Vec<ActionResult>,
}

/// 一个子任务的有序步骤历史
pub type StepHistory = Vec<ExecutionStep>;

/// 交给执行器的一次子任务请求
#[derive(Clone, Debug)]
pub struct SubtaskRequest {
    /// 清单下标（从 0 开始）
    pub index: usize,
    /// 原始子任务描述
    pub subtask: String,
    /// 子任务范围内的完整指令（描述 + 总目标 + 进度摘要 + 操作约定）
    pub instructions: String,
    /// 最大步数
    pub step_budget: usize,
    /// 开始前先打开的 URL（仅第一个子任务）
    pub initial_url: Option<String>,
    /// 占位符 -> 机密值，执行器在输入时替换；不得写入日志
    pub sensitive_data: HashMap<String, String>,
}

/// 外部单子任务执行引擎
///
/// 在共享会话上、从 active_page 开始执行 request，不得超过 step_budget 步；内部失败返回 Err。
#[async_trait]
pub trait StepExecutor<S: BrowserSession>: Send + Sync {
    async fn run(
        &self,
        request: &SubtaskRequest,
        session: &S,
        active_page: Option<&TabHandle>,
    ) -> anyhow::Result<StepHistory>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_serialization_shape() {
        let step = ExecutionStep {
            screenshot: Some(ScreenshotRef::Base64("aGVsbG8=".into())),
            model_output: Some("click search".into()),
            results: vec![ActionResult::done()],
        };
        let v = serde_json::to_value(&step).unwrap();
        assert_eq!(v["screenshot"]["kind"], "base64");
        assert_eq!(v["results"][0]["is_done"], true);

        assert!(v["results"][0].get("extracted_content").is_none());

        let back: ExecutionStep = serde_json::from_value(v).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn test_done_keeps_extracted_content() {
        let result = ActionResult::done_with(Some("Driver 551.86".into()));
        assert!(result.is_done);
        assert_eq!(result.extracted_content.as_deref(), Some("Driver 551.86"));

        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["extracted_content"], "Driver 551.86");

        // 旧记录没有该字段
        let old: ActionResult = serde_json::from_str(r#"{"is_done": true, "error": null}"#).unwrap();
        assert_eq!(old, ActionResult::done());
    }
}
