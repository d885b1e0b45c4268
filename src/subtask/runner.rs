//! 子任务运行器
//!
//! 对一次 step executor 调用施加墙钟时限（从本次调用开始计时），并与运行级取消令牌竞速；
//! 先完成的一方决定结果，输掉的执行器 future 直接被丢弃而不再等待。
//! 结果归为 Completed / TimedOut / Raised / Cancelled 之一，只更新当前下标的状态；
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::browser::{BrowserSession, TabHandle};
use crate::checklist::StatusTracker;
use crate::core::AgentError;
use crate::subtask::{StepExecutor, StepHistory, SubtaskRequest};

/// 一次子任务调用的分类结果
#[derive(Debug)]
pub enum SubtaskOutcome {
    Completed(StepHistory),
    TimedOut,
    Raised(String),
    Cancelled,
}

impl SubtaskOutcome {
    fn label(&self) -> &'static str {
        match self {
            SubtaskOutcome::Completed(_) => "ok",
            SubtaskOutcome::TimedOut => "timeout",
            SubtaskOutcome::Raised(_) => "error",
            SubtaskOutcome::Cancelled => "cancelled",
        }
    }
}

/// 子任务运行器：持有执行器与单子任务时限
pub struct SubtaskRunner<S: BrowserSession> {
    executor: Arc<dyn StepExecutor<S>>,
    timeout: Duration,
}

impl<S: BrowserSession> SubtaskRunner<S> {
    pub fn new(executor: Arc<dyn StepExecutor<S>>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 调用执行器并分类结果，不触碰任何状态
    pub async fn invoke(
        &self,
        request: &SubtaskRequest,
        session: &S,
        active_page: Option<&TabHandle>,
        cancel: &CancellationToken,
    ) -> SubtaskOutcome {
        let start = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => SubtaskOutcome::Cancelled,
            res = timeout(self.timeout, self.executor.run(request, session, active_page)) => {
                match res {
                    Ok(Ok(history)) => SubtaskOutcome::Completed(history),
                    Ok(Err(e)) => SubtaskOutcome::Raised(format!("{:#}", e)),
                    Err(_) => SubtaskOutcome::TimedOut,
                }
            }
        };

        let steps = match &outcome {
            SubtaskOutcome::Completed(h) => h.len(),
            _ => 0,
        };
        let audit = serde_json::json!({
            "event": "subtask_audit",
            "index": request.index,
            "outcome": outcome.label(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "steps": steps,
        });
        tracing::info!(audit = %audit.to_string(), "subtask");

        outcome
    }

    /// 执行当前子任务：Completed 时标记 Done 并返回步骤历史；
    /// 其余结果标记 Failed（超时写入「timed out after <秒>s」，抛错写入错误文本）并返回终止运行的错误
    pub async fn execute(
        &self,
        request: &SubtaskRequest,
        session: &S,
        active_page: Option<&TabHandle>,
        tracker: &mut StatusTracker,
        cancel: &CancellationToken,
    ) -> Result<StepHistory, AgentError> {
        let index = request.index;
        let error = match self.invoke(request, session, active_page, cancel).await {
            SubtaskOutcome::Completed(history) => {
                tracker.mark_done(index)?;
                return Ok(history);
            }
            SubtaskOutcome::TimedOut => {
                tracing::warn!(
                    "Subtask {} timed out after {:?}s",
                    index + 1,
                    self.timeout.as_secs_f64()
                );
                AgentError::SubtaskTimeout {
                    index,
                    secs: self.timeout.as_secs_f64(),
                }
            }
            SubtaskOutcome::Raised(message) => {
                tracing::warn!("Error in subtask {}: {}", index + 1, message);
                AgentError::SubtaskExecution { index, message }
            }
            SubtaskOutcome::Cancelled => {
                tracing::warn!("Subtask {} cancelled", index + 1);
                AgentError::Cancelled
            }
        };

        tracker.mark_failed(index, error.status_detail())?;
        Err(error)
    }
}
