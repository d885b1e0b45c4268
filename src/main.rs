//! Waggle - 清单驱动的网页浏览智能体
//!
//! 用法：`waggle "<任务描述>" <网站> [--config <文件>] [--output-dir <目录>]`
//! 入口：初始化日志与配置，启动编排器完成一次运行，并把轨迹导出到 output_dir。

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use waggle::browser::{ChromeSession, ChromeStepExecutor};
use waggle::checklist::LlmChecklistPlanner;
use waggle::cli::Cli;
use waggle::config::{load_config, AppConfig};
use waggle::core::SessionSupervisor;
use waggle::llm::create_llm_from_config;
use waggle::trace::{save_failure, save_trace};
use waggle::{observability, Orchestrator, OrchestratorOptions, RunAborted};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cli = Cli::parse();
    let task = cli.to_task();

    let mut cfg = load_config(cli.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed, using defaults: {}", e);
        AppConfig::default()
    });
    cli.apply(&mut cfg);

    let out_dir = cfg.app.output_dir.join(task_slug(&task.description));
    if cfg.app.skip_existing && is_non_empty_dir(&out_dir) {
        tracing::info!(dir = %out_dir.display(), "Output exists, skipping task");
        return Ok(());
    }

    let llm = create_llm_from_config(&cfg);
    let planner = Arc::new(LlmChecklistPlanner::new(Arc::clone(&llm)));
    let executor = Arc::new(ChromeStepExecutor::new(llm));
    let session = ChromeSession::new((&cfg.browser).into());

    let supervisor = Arc::new(SessionSupervisor::new());
    supervisor.install_signal_handlers();

    let mut orchestrator = Orchestrator::new(
        session,
        planner,
        executor,
        OrchestratorOptions::from(&cfg.agent),
    )
    .with_supervisor(supervisor.as_ref().clone());

    match orchestrator.run(&task).await {
        Ok(trace) => {
            save_trace(&trace, &task.description, &out_dir).context("Failed to save trajectory")?;
            tracing::info!(dir = %out_dir.display(), "Trajectory saved");
            Ok(())
        }
        Err(RunAborted { error, partial }) => {
            if partial.steps.is_empty() && partial.subtask_statuses.is_empty() {
                save_failure(&task.description, &error.to_string(), &out_dir)
                    .context("Failed to save failure record")?;
            } else {
                save_trace(&partial, &task.description, &out_dir)
                    .context("Failed to save partial trajectory")?;
            }
            Err(anyhow::Error::new(error).context("Run aborted"))
        }
    }
}

/// 任务描述转为目录名：保留字母数字，其余替换为下划线，最长 80 字符
fn task_slug(description: &str) -> String {
    let slug: String = description
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .take(80)
        .collect();
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        slug
    }
}

fn is_non_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
