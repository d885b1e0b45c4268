//! Waggle - 分层浏览智能体
//!
//! 把一个高层浏览任务拆成有序的原子子任务清单，在同一个持续持有的浏览器会话中逐项执行，
//! 最终产出一条统一的执行轨迹。
//!
//! 模块划分：
//! - **browser**: 浏览器会话边界、标签页交接；feature "browser" 下的 Headless Chrome 实现
//! - **checklist**: 任务 / 清单、两阶段 LLM 规划器、子任务状态追踪
//! - **cli**: 命令行参数（clap）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、运行状态机、会话监管、编排器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）
//! - **observability**: 日志初始化
//! - **subtask**: Step executor 边界、子任务指令、带时限的子任务运行器
//! - **trace**: 轨迹汇总与落盘

pub mod browser;
pub mod checklist;
pub mod cli;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod subtask;
pub mod trace;

pub use checklist::{Checklist, Task};
pub use core::{AgentError, Orchestrator, OrchestratorOptions, RunAborted};
pub use trace::Trace;
