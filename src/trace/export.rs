//! 轨迹落盘（Mind2Web 评测布局）
//!
//! ```text
//! <dir>/trajectory/0.png, 1.png, ...
//! <dir>/result.json
//! ```
//!
//! 截图为磁盘路径时优先硬链接、失败再复制；为 base64 时解码写入。无法解码的截图静默跳过。

use std::fs;
use std::path::Path;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;

use crate::checklist::SubtaskStatus;
use crate::subtask::{ExecutionStep, ScreenshotRef};
use crate::trace::Trace;

/// result.json 内容
#[derive(Debug, Serialize)]
struct ResultFile<'a> {
    task: &'a str,
    action_history: Vec<String>,
    thoughts: Option<String>,
    final_result_response: Option<String>,
    input_image_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtask_history: Option<&'a [SubtaskStatus]>,
}

/// 写出轨迹截图与 result.json
pub fn save_trace(trace: &Trace, task: &str, dir: &Path) -> anyhow::Result<()> {
    let traj_dir = dir.join("trajectory");
    fs::create_dir_all(&traj_dir)
        .with_context(|| format!("create {}", traj_dir.display()))?;

    let mut screenshot_paths = Vec::new();
    let mut action_history = Vec::new();
    let mut final_response = None;

    for (i, step) in trace.steps.iter().enumerate() {
        if let Some(shot) = &step.screenshot {
            let dst = traj_dir.join(format!("{}.png", i));
            match write_screenshot(shot, &dst) {
                Ok(()) => screenshot_paths.push(format!("trajectory/{}.png", i)),
                Err(e) => tracing::debug!(step = i, "skip screenshot: {:#}", e),
            }
        }

        if let Some(text) = &step.model_output {
            action_history.push(text.clone());
        }

        if let Some(resp) = final_response_of(step) {
            final_response = Some(resp);
        }
    }

    let thoughts = (!action_history.is_empty()).then(|| action_history.join("\n---\n"));
    screenshot_paths.truncate(1);

    let result = ResultFile {
        task,
        action_history,
        thoughts,
        final_result_response: final_response,
        input_image_paths: screenshot_paths,
        subtask_history: Some(trace.subtask_statuses.as_slice()),
    };
    write_result(dir, &result)
}

/// 运行在产生轨迹前就失败时，写出最小 result.json
pub fn save_failure(task: &str, error: &str, dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let result = ResultFile {
        task,
        action_history: Vec::new(),
        thoughts: None,
        final_result_response: Some(format!("Exception: {}", error)),
        input_image_paths: Vec::new(),
        subtask_history: None,
    };
    write_result(dir, &result)
}

/// 最后一个 is_done 或带错误的结果：错误文本优先，否则为 `<done>`
fn final_response_of(step: &ExecutionStep) -> Option<String> {
    step.results
        .iter()
        .rev()
        .find(|r| r.is_done || r.error.is_some())
        .map(|r| r.error.clone().unwrap_or_else(|| "<done>".to_string()))
}

fn write_screenshot(shot: &ScreenshotRef, dst: &Path) -> anyhow::Result<()> {
    match shot {
        ScreenshotRef::Path(src) => {
            if !src.exists() {
                anyhow::bail!("screenshot file missing: {}", src.display());
            }
            let src = src.canonicalize()?;
            if fs::hard_link(&src, dst).is_err() {
                fs::copy(&src, dst)?;
            }
        }
        ScreenshotRef::Base64(data) => {
            let bytes = BASE64.decode(data.trim())?;
            fs::write(dst, bytes)?;
        }
    }
    Ok(())
}

fn write_result(dir: &Path, result: &ResultFile<'_>) -> anyhow::Result<()> {
    let path = dir.join("result.json");
    let json = serde_json::to_string_pretty(result)?;
    fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
