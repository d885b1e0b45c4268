//! 子任务指令构造
//!
//! 把原始子任务描述、总目标（仅供参考）、进度摘要与固定的操作约定拼成执行器的额外系统消息。

/// 固定操作约定：从活动页开始；受阻时开新标签页搜索；结束前收敛到一个标签页；显式声明完成
const OPERATING_PROTOCOL: &str = "\
### How to work on the *current* subtask
1. Start in the active tab.
2. **If** you need new information, the element you need is missing, or you have taken
   two actions without progress – **open a NEW tab** and run a Google query whose
   keywords come from the subtask description.
3. Close any tabs you no longer need so that **only one tab is left** before you finish.
4. When the subtask is complete, return `DONE` and any required result data.

Stay strictly inside the scope of the current subtask; do not begin future subtasks early.";

/// 生成子任务范围内的指令
pub fn build_instructions(subtask: &str, goal: &str, progress: &str) -> String {
    format!(
        "### Context
You are an **autonomous browser agent** executing one checklist item at a time inside a
shared browser session.

• **Current subtask**
{subtask}

• **High-level goal (for reference only)**
{goal}

### Checklist status
{progress}

{OPERATING_PROTOCOL}
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instructions_contain_all_parts() {
        let text = build_instructions(
            "Click the Drivers link",
            "Find the latest NVIDIA driver",
            "🔄 Step 1: Click the Drivers link (COMING UP NEXT)",
        );
        assert!(text.contains("Click the Drivers link"));
        assert!(text.contains("Find the latest NVIDIA driver"));
        assert!(text.contains("(COMING UP NEXT)"));
        assert!(text.contains("open a NEW tab"));
        assert!(text.contains("do not begin future subtasks early"));
    }
}
