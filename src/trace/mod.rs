//! 轨迹汇总
//!
//! 按子任务执行顺序、子任务内步骤顺序，把各子任务的步骤历史拼成一条扁平轨迹；
//! 不去重、不重排。finalize 时附上状态列表的只读快照。

pub mod export;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checklist::{StatusTracker, SubtaskStatus};
use crate::subtask::{ExecutionStep, StepHistory};

pub use export::{save_failure, save_trace};

/// 一次运行的唯一产物
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<ExecutionStep>,
    pub subtask_statuses: Vec<SubtaskStatus>,
}

/// 运行期间增量构建轨迹
#[derive(Debug)]
pub struct TraceBuilder {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    steps: Vec<ExecutionStep>,
}

impl TraceBuilder {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            steps: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// 已记录的步骤数
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 追加刚完成子任务的全部步骤，保持原有顺序
    pub fn append(&mut self, history: StepHistory) {
        self.steps.extend(history);
    }

    /// 生成轨迹：步骤 + 状态快照；构建器保持可用（中止时也可得到部分轨迹）
    pub fn finalize(&self, statuses: &StatusTracker) -> Trace {
        Trace {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Some(Utc::now()),
            steps: self.steps.clone(),
            subtask_statuses: statuses.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtask::ActionResult;

    fn step(text: &str) -> ExecutionStep {
        ExecutionStep {
            screenshot: None,
            model_output: Some(text.to_string()),
            results: vec![ActionResult::ok()],
        }
    }

    #[test]
    fn test_append_preserves_order_across_subtasks() {
        let mut builder = TraceBuilder::new(Uuid::new_v4());
        builder.append(vec![step("1a"), step("1b")]);
        builder.append(vec![]);
        builder.append(vec![step("3a")]);

        let trace = builder.finalize(&StatusTracker::default());
        let outputs: Vec<_> = trace
            .steps
            .iter()
            .map(|s| s.model_output.as_deref().unwrap())
            .collect();
        assert_eq!(outputs, vec!["1a", "1b", "3a"]);
        assert!(trace.finished_at.is_some());
    }

    #[test]
    fn test_finalize_snapshots_statuses() {
        let mut tracker = StatusTracker::initialize(&["a".to_string(), "b".to_string()]);
        tracker.mark_running(0).unwrap();
        let builder = TraceBuilder::new(Uuid::new_v4());

        let trace = builder.finalize(&tracker);
        tracker.mark_done(0).unwrap();

        // 快照不随之后的变更而改变
        assert_eq!(trace.subtask_statuses[0].state, crate::checklist::SubtaskState::Running);
    }
}
