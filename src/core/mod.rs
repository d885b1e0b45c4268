//! 核心编排层：错误、运行状态机、会话监管、主控循环

pub mod error;
pub mod orchestrator;
pub mod session_supervisor;
pub mod state;

pub use error::{AgentError, RunAborted};
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use session_supervisor::SessionSupervisor;
pub use state::{RunPhase, RunProgress};
