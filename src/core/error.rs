//! 运行错误类型
//!
//! 所有错误都会终止整次运行（fail-fast），本层不做自动重试；重试策略属于调用方。
//! 无论从哪条路径退出，浏览器会话都会先被清理，再把错误连同已累积的部分轨迹交给调用方。

use thiserror::Error;

use crate::trace::Trace;

/// 一次运行中可能出现的错误（规划、子任务超时/失败、会话丢失、取消等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 规划服务返回空清单或格式错误，没有清单就不执行任何子任务
    #[error("Planning failed: {0}")]
    Planning(String),

    /// 子任务超过墙钟时限（从该子任务开始计时）；index 从 0 开始，展示时从 1 开始
    #[error("Subtask {} timed out after {:?}s", .index + 1, .secs)]
    SubtaskTimeout { index: usize, secs: f64 },

    /// Step executor 内部抛错
    #[error("Subtask {} failed: {}", .index + 1, .message)]
    SubtaskExecution { index: usize, message: String },

    /// 浏览器会话无法启动或在运行中丢失
    #[error("Browser session error: {0}")]
    Session(String),

    #[error("Run cancelled")]
    Cancelled,

    /// 对非当前下标的状态做了变更（编排循环保证不会发生）
    #[error("Subtask status {index} mutated out of order")]
    StatusOutOfOrder { index: usize },
}

impl AgentError {
    /// 写入 SubtaskStatus.error 的文字说明
    pub fn status_detail(&self) -> String {
        match self {
            AgentError::SubtaskTimeout { secs, .. } => format!("timed out after {:?}s", secs),
            AgentError::SubtaskExecution { message, .. } => message.clone(),
            AgentError::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        }
    }
}

/// 运行被中止：触发错误 + 截至失败时已累积的轨迹与状态（调用方可落盘用于诊断）
#[derive(Error, Debug)]
#[error("{error}")]
pub struct RunAborted {
    #[source]
    pub error: AgentError,
    pub partial: Trace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_detail_keeps_fractional_seconds() {
        let err = AgentError::SubtaskTimeout { index: 1, secs: 60.0 };
        assert_eq!(err.status_detail(), "timed out after 60.0s");
        assert_eq!(err.to_string(), "Subtask 2 timed out after 60.0s");
    }

    #[test]
    fn test_execution_detail_is_raw_message() {
        let err = AgentError::SubtaskExecution {
            index: 0,
            message: "element not found".to_string(),
        };
        assert_eq!(err.status_detail(), "element not found");
    }
}
