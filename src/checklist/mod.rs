//! 清单层：任务、清单、规划器与子任务状态追踪

pub mod planner;
pub mod status;

use std::ops::Deref;

use serde::{Deserialize, Serialize};

pub use planner::{parse_plan, ChecklistPlanner, LlmChecklistPlanner};
pub use status::{StatusTracker, SubtaskState, SubtaskStatus};

/// 一次运行的输入：高层目标 + 目标站点
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    pub website: String,
}

impl Task {
    pub fn new(description: impl Into<String>, website: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            website: website.into(),
        }
    }
}

/// 有序、不可变的子任务清单；只能通过 `Checklist::new` 构造，保证非空
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Checklist(Vec<String>);

impl Checklist {
    /// 清单为空或含空白项时返回 None
    pub fn new(steps: Vec<String>) -> Option<Self> {
        let steps: Vec<String> = steps.into_iter().map(|s| s.trim().to_string()).collect();
        if steps.is_empty() || steps.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self(steps))
    }

    pub fn steps(&self) -> &[String] {
        &self.0
    }
}

impl Deref for Checklist {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checklist_rejects_empty_and_blank() {
        assert!(Checklist::new(vec![]).is_none());
        assert!(Checklist::new(vec!["open page".into(), "  ".into()]).is_none());
        let c = Checklist::new(vec![" open page ".into(), "click".into()]).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c[0], "open page");
    }
}
