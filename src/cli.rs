//! 命令行参数

use std::path::PathBuf;

use clap::Parser;

use crate::checklist::Task;
use crate::config::AppConfig;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "waggle",
    version,
    about = "Checklist-driven browsing agent: plan a web task, run each step in one browser session"
)]
pub struct Cli {
    /// High-level task description
    pub task: String,

    /// Target website (domain or URL)
    pub website: String,

    /// Extra config file layered over config/default.toml
    #[arg(long, env = "WAGGLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override [app].output_dir
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl Cli {
    pub fn to_task(&self) -> Task {
        Task::new(self.task.clone(), self.website.clone())
    }

    /// 命令行参数优先于配置文件
    pub fn apply(&self, cfg: &mut AppConfig) {
        if let Some(dir) = &self.output_dir {
            cfg.app.output_dir = dir.clone();
        }
    }
}
