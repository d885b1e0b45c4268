//! 运行状态机与进度投影
//!
//! Initializing -> Planning -> ExecutingSubtask(i) -> HandingOff(i) -> ExecutingSubtask(i+1) -> …
//! -> Finalizing -> Completed | Aborted。
//! 编排器把 RunProgress 通过 watch 通道推给观察者（UI、测试），观察者只读。

use serde::Serialize;

use crate::checklist::{SubtaskState, SubtaskStatus};

/// 运行阶段（下标从 0 开始）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "index", rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Initializing,
    Planning,
    ExecutingSubtask(usize),
    HandingOff(usize),
    Finalizing,
    Completed,
    Aborted,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Aborted)
    }
}

/// 观察者看到的「投影」状态
#[derive(Clone, Debug, Serialize)]
pub struct RunProgress {
    pub phase: RunPhase,
    pub statuses: Vec<SubtaskStatus>,
    /// 已汇入轨迹的步骤数
    pub steps: usize,
}

impl Default for RunProgress {
    fn default() -> Self {
        Self {
            phase: RunPhase::Idle,
            statuses: Vec::new(),
            steps: 0,
        }
    }
}

impl RunProgress {
    /// 顺序执行不变式：至多一个 Running；其之前全是终态，之后全是 Pending
    pub fn is_consistent(&self) -> bool {
        let running: Vec<usize> = self
            .statuses
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == SubtaskState::Running)
            .map(|(i, _)| i)
            .collect();

        let boundary = match running.as_slice() {
            [] => self
                .statuses
                .iter()
                .position(|s| s.state == SubtaskState::Pending)
                .unwrap_or(self.statuses.len()),
            [i] => *i,
            _ => return false,
        };

        let before_ok = self.statuses[..boundary]
            .iter()
            .all(|s| s.state.is_terminal());
        let after_start = if running.is_empty() { boundary } else { boundary + 1 };
        let after_ok = self.statuses[after_start..]
            .iter()
            .all(|s| s.state == SubtaskState::Pending);
        before_ok && after_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(states: &[SubtaskState]) -> RunProgress {
        RunProgress {
            phase: RunPhase::Idle,
            statuses: states
                .iter()
                .map(|s| SubtaskStatus {
                    state: *s,
                    ..SubtaskStatus::pending("x")
                })
                .collect(),
            steps: 0,
        }
    }

    #[test]
    fn test_consistency_check() {
        use SubtaskState::*;
        assert!(progress(&[]).is_consistent());
        assert!(progress(&[Done, Running, Pending]).is_consistent());
        assert!(progress(&[Done, Failed, Pending]).is_consistent());
        assert!(progress(&[Done, Done]).is_consistent());
        assert!(!progress(&[Running, Running]).is_consistent());
        assert!(!progress(&[Pending, Done]).is_consistent());
        assert!(!progress(&[Done, Running, Done]).is_consistent());
    }

    #[test]
    fn test_phase_serialization() {
        let v = serde_json::to_value(RunPhase::ExecutingSubtask(2)).unwrap();
        assert_eq!(v["phase"], "executing_subtask");
        assert_eq!(v["index"], 2);
        assert!(RunPhase::Aborted.is_terminal());
    }
}
