//! 会话监管：运行级取消
//!
//! 持有 CancellationToken：用户 Ctrl+C / SIGTERM 或调用方主动取消时终止当前运行；
//! 每个子任务使用子 token，运行被取消时正在执行的子任务随之取消。取消不可恢复，被取消的子任务不会在同一次运行中重试。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// 运行级生命周期管理：取消令牌
#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 触发取消
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 创建子 token（用于单个子任务）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)，收到信号即取消当前运行
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, cancelling run...");
                supervisor.cancel();
            }
        });

        #[cfg(unix)]
        {
            let supervisor = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, cancelling run...");
                    supervisor.cancel();
                }
            });
        }
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_propagates_to_children() {
        let supervisor = SessionSupervisor::new();
        let child = supervisor.child_token();
        assert!(!supervisor.is_cancelled());
        assert!(!child.is_cancelled());

        supervisor.cancel();
        assert!(supervisor.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_cancel_does_not_cancel_parent() {
        let supervisor = SessionSupervisor::new();
        let child = supervisor.child_token();
        child.cancel();
        assert!(!supervisor.is_cancelled());
    }
}
