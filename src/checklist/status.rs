//! 子任务状态追踪
//!
//! 每个清单项一条 SubtaskStatus，按下标存放（arena），只允许编排循环的「当前项」被修改：
//! - 当前项之前的状态全部为终态（Done / Failed）
//! - 当前项之后的状态全部为 Pending
//! - 任一时刻至多一条 Running
//!
//! render_progress 生成注入子任务指令的进度摘要，让执行器知道前面各项的结果。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 子任务生命周期
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskState {
    Pending,
    Running,
    Done,
    Failed,
}

impl SubtaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubtaskState::Done | SubtaskState::Failed)
    }
}

/// 单个子任务的状态记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubtaskStatus {
    pub name: String,
    pub state: SubtaskState,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SubtaskStatus {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: SubtaskState::Pending,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// 状态追踪器：按清单顺序持有全部状态，只暴露纯读 / 顺序更新操作
#[derive(Clone, Debug, Default)]
pub struct StatusTracker {
    statuses: Vec<SubtaskStatus>,
}

impl StatusTracker {
    /// 每个清单项创建一条 Pending 状态，顺序保持不变
    pub fn initialize(checklist: &[String]) -> Self {
        Self {
            statuses: checklist.iter().map(SubtaskStatus::pending).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SubtaskStatus> {
        self.statuses.get(index)
    }

    pub fn statuses(&self) -> &[SubtaskStatus] {
        &self.statuses
    }

    /// 当前 Running 的下标（若有）
    pub fn running_index(&self) -> Option<usize> {
        self.statuses
            .iter()
            .position(|s| s.state == SubtaskState::Running)
    }

    /// 第一个 Pending 的下标，即下一个允许开始的子任务
    fn next_index(&self) -> Option<usize> {
        self.statuses
            .iter()
            .position(|s| s.state == SubtaskState::Pending)
    }

    /// Pending -> Running；只允许对下一个待执行项调用，且此前不能有 Running
    pub fn mark_running(&mut self, index: usize) -> Result<(), AgentError> {
        if self.running_index().is_some() || self.next_index() != Some(index) {
            return Err(AgentError::StatusOutOfOrder { index });
        }
        let status = &mut self.statuses[index];
        status.state = SubtaskState::Running;
        status.started_at = Some(Utc::now());
        Ok(())
    }

    /// Running -> Done
    pub fn mark_done(&mut self, index: usize) -> Result<(), AgentError> {
        let status = self.running_mut(index)?;
        status.state = SubtaskState::Done;
        status.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Running -> Failed，附带原因
    pub fn mark_failed(&mut self, index: usize, detail: impl Into<String>) -> Result<(), AgentError> {
        let status = self.running_mut(index)?;
        status.state = SubtaskState::Failed;
        status.error = Some(detail.into());
        status.finished_at = Some(Utc::now());
        Ok(())
    }

    fn running_mut(&mut self, index: usize) -> Result<&mut SubtaskStatus, AgentError> {
        match self.statuses.get_mut(index) {
            Some(status) if status.state == SubtaskState::Running => Ok(status),
            _ => Err(AgentError::StatusOutOfOrder { index }),
        }
    }

    /// 进度摘要：当前项之前标注完成 / 失败原因，当前项标注 COMING UP NEXT，之后的标注 pending
    pub fn render_progress(&self, current: usize) -> String {
        self.statuses
            .iter()
            .enumerate()
            .map(|(i, st)| {
                let n = i + 1;
                if i < current {
                    match (st.state, st.error.as_deref()) {
                        (SubtaskState::Failed, Some(err)) => {
                            format!("❌ Step {}: {} (error: {})", n, st.name, err)
                        }
                        (SubtaskState::Failed, None) => format!("❌ Step {}: {}", n, st.name),
                        _ => format!("✔️ Step {}: {}", n, st.name),
                    }
                } else if i == current {
                    format!("🔄 Step {}: {} (COMING UP NEXT)", n, st.name)
                } else {
                    format!("⏳ Step {}: {} (pending)", n, st.name)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 只读快照，随 Trace 一起返回
    pub fn snapshot(&self) -> Vec<SubtaskStatus> {
        self.statuses.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> StatusTracker {
        StatusTracker::initialize(&[
            "open search page".to_string(),
            "apply filter X".to_string(),
            "select first result".to_string(),
        ])
    }

    #[test]
    fn test_initialize_all_pending_in_order() {
        let t = tracker();
        assert_eq!(t.len(), 3);
        assert!(t.statuses().iter().all(|s| s.state == SubtaskState::Pending));
        assert_eq!(t.get(1).unwrap().name, "apply filter X");
    }

    #[test]
    fn test_sequential_transitions() {
        let mut t = tracker();
        t.mark_running(0).unwrap();
        assert_eq!(t.running_index(), Some(0));
        t.mark_done(0).unwrap();
        t.mark_running(1).unwrap();
        t.mark_failed(1, "timed out after 60.0s").unwrap();

        let states: Vec<_> = t.statuses().iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![SubtaskState::Done, SubtaskState::Failed, SubtaskState::Pending]
        );
        assert_eq!(t.get(1).unwrap().error.as_deref(), Some("timed out after 60.0s"));
        assert!(t.get(0).unwrap().finished_at.is_some());
    }

    #[test]
    fn test_out_of_order_mutation_rejected() {
        let mut t = tracker();
        assert!(matches!(
            t.mark_running(1),
            Err(AgentError::StatusOutOfOrder { index: 1 })
        ));
        assert!(t.mark_done(0).is_err());

        t.mark_running(0).unwrap();
        // 已有 Running 时不能再开始下一项
        assert!(t.mark_running(1).is_err());
        assert!(t.mark_failed(2, "x").is_err());
        assert!(t.mark_done(7).is_err());
    }

    #[test]
    fn test_render_progress() {
        let mut t = tracker();
        t.mark_running(0).unwrap();
        t.mark_done(0).unwrap();

        let digest = t.render_progress(1);
        let lines: Vec<_> = digest.lines().collect();
        assert_eq!(lines[0], "✔️ Step 1: open search page");
        assert_eq!(lines[1], "🔄 Step 2: apply filter X (COMING UP NEXT)");
        assert_eq!(lines[2], "⏳ Step 3: select first result (pending)");
    }

    #[test]
    fn test_render_progress_includes_failure_reason() {
        let mut t = tracker();
        t.mark_running(0).unwrap();
        t.mark_failed(0, "boom").unwrap();
        let digest = t.render_progress(1);
        assert!(digest.starts_with("❌ Step 1: open search page (error: boom)"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_value(SubtaskStatus::pending("a")).unwrap();
        assert_eq!(json["state"], "pending");
        assert!(json["error"].is_null());
        assert!(json.get("started_at").is_none());
    }
}
