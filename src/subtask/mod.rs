//! 子任务层：执行器边界、指令构造、带时限的子任务运行器

pub mod executor;
pub mod instructions;
pub mod runner;

pub use executor::{
    ActionResult, ExecutionStep, ScreenshotRef, StepExecutor, StepHistory, SubtaskRequest,
};
pub use instructions::build_instructions;
pub use runner::{SubtaskOutcome, SubtaskRunner};
