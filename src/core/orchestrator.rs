//! 编排器：主控循环
//!
//! 负责：启动共享浏览器会话 -> 规划清单（一次）-> 逐项执行子任务（带时限）-> 子任务之间交接标签页
//! -> 汇总轨迹。任何一项失败都终止整次运行（后续子任务依赖成功前驱留下的页面状态）。
//! 无论成功、规划失败、超时、执行器报错还是被取消，Finalizing 阶段都只执行一次：
//! 先生成（部分）轨迹，再释放浏览器会话，最后把结果或错误交给调用方。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use uuid::Uuid;

use crate::browser::{handoff, BrowserSession, TabHandle};
use crate::checklist::{Checklist, ChecklistPlanner, StatusTracker, Task};
use crate::config::{AgentSection, MAX_SUBTASK_TIMEOUT_SECS};
use crate::core::{AgentError, RunAborted, RunPhase, RunProgress, SessionSupervisor};
use crate::subtask::{build_instructions, StepExecutor, SubtaskRequest, SubtaskRunner};
use crate::trace::{Trace, TraceBuilder};

/// 编排参数
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// 单个子任务的墙钟时限
    pub subtask_timeout: Duration,
    /// 单个子任务的最大动作数
    pub max_actions_per_subtask: usize,
    /// 第一个子任务开始前先打开目标站点
    pub open_site_first: bool,
    pub sensitive_data: HashMap<String, String>,
}

const DEFAULT_SUBTASK_TIMEOUT: Duration = Duration::from_secs(60);

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            subtask_timeout: DEFAULT_SUBTASK_TIMEOUT,
            max_actions_per_subtask: 25,
            open_site_first: true,
            sensitive_data: HashMap::new(),
        }
    }
}

impl From<&AgentSection> for OrchestratorOptions {
    /// 未经 validate 的时限也不会 panic：超出上限截断，NaN 回落到默认值
    fn from(cfg: &AgentSection) -> Self {
        let secs = cfg.subtask_timeout_secs.clamp(0.0, MAX_SUBTASK_TIMEOUT_SECS);
        Self {
            subtask_timeout: Duration::try_from_secs_f64(secs).unwrap_or(DEFAULT_SUBTASK_TIMEOUT),
            max_actions_per_subtask: cfg.max_actions_per_subtask,
            open_site_first: cfg.open_site_first,
            sensitive_data: cfg.sensitive_data.clone(),
        }
    }
}

/// 单次运行内的可变状态：状态追踪器 + 轨迹构建器
struct RunContext {
    tracker: StatusTracker,
    trace: TraceBuilder,
}

/// 编排器：独占共享浏览器会话，顺序驱动清单中的每个子任务
pub struct Orchestrator<S: BrowserSession> {
    session: S,
    planner: Arc<dyn ChecklistPlanner>,
    runner: SubtaskRunner<S>,
    options: OrchestratorOptions,
    supervisor: SessionSupervisor,
    progress_tx: watch::Sender<RunProgress>,
}

impl<S: BrowserSession> Orchestrator<S> {
    pub fn new(
        session: S,
        planner: Arc<dyn ChecklistPlanner>,
        executor: Arc<dyn StepExecutor<S>>,
        options: OrchestratorOptions,
    ) -> Self {
        let (progress_tx, _) = watch::channel(RunProgress::default());
        Self {
            session,
            planner,
            runner: SubtaskRunner::new(executor, options.subtask_timeout),
            options,
            supervisor: SessionSupervisor::new(),
            progress_tx,
        }
    }

    /// 使用外部的监管器（例如已安装信号处理器的那个）
    pub fn with_supervisor(mut self, supervisor: SessionSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// 订阅运行进度（阶段 + 状态列表 + 已记录步骤数）
    pub fn subscribe(&self) -> watch::Receiver<RunProgress> {
        self.progress_tx.subscribe()
    }

    /// 执行一次完整运行
    ///
    /// 成功时返回全部子任务为 Done 的完整轨迹；失败时返回触发错误与截至失败的部分轨迹。
    /// `&mut self` 保证同一时刻只有一次运行持有会话。
    pub async fn run(&mut self, task: &Task) -> Result<Trace, RunAborted> {
        let mut ctx = RunContext {
            tracker: StatusTracker::default(),
            trace: TraceBuilder::new(Uuid::new_v4()),
        };
        tracing::info!(
            run_id = %ctx.trace.run_id(),
            site = %task.website,
            "Run started: {}",
            task.description
        );

        let outcome = self.drive(task, &mut ctx).await;

        // 唯一的清理阶段：所有退出路径都经过这里且只经过一次
        self.publish(RunPhase::Finalizing, &ctx);
        let trace = ctx.trace.finalize(&ctx.tracker);
        self.teardown().await;

        match outcome {
            Ok(()) => {
                self.publish(RunPhase::Completed, &ctx);
                tracing::info!(steps = trace.steps.len(), "Run completed");
                Ok(trace)
            }
            Err(error) => {
                self.publish(RunPhase::Aborted, &ctx);
                tracing::warn!(steps = trace.steps.len(), "Run aborted: {}", error);
                Err(RunAborted {
                    error,
                    partial: trace,
                })
            }
        }
    }

    async fn drive(&self, task: &Task, ctx: &mut RunContext) -> Result<(), AgentError> {
        let cancel = self.supervisor.cancel_token();

        self.publish(RunPhase::Initializing, ctx);
        self.session
            .start()
            .await
            .map_err(|e| AgentError::Session(format!("start failed: {:#}", e)))?;

        self.publish(RunPhase::Planning, ctx);
        let checklist = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            planned = self.planner.plan(task) => planned?,
        };
        ctx.tracker = StatusTracker::initialize(&checklist);
        tracing::info!("Checklist planned with {} subtasks", checklist.len());

        let total = checklist.len();
        let mut active_page: Option<TabHandle> = None;

        for (index, subtask) in checklist.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            tracing::info!("Subtask {}/{}  ➜  {}", index + 1, total, subtask);

            ctx.tracker.mark_running(index)?;
            self.publish(RunPhase::ExecutingSubtask(index), ctx);

            let request = self.build_request(task, &checklist, index, &ctx.tracker);
            tracing::debug!(index, instructions = %request.instructions, "subtask instructions");

            let history = self
                .runner
                .execute(
                    &request,
                    &self.session,
                    active_page.as_ref(),
                    &mut ctx.tracker,
                    &self.supervisor.child_token(),
                )
                .await?;
            ctx.trace.append(history);

            self.publish(RunPhase::HandingOff(index), ctx);
            active_page = handoff(&self.session).await?;
        }

        Ok(())
    }

    fn build_request(
        &self,
        task: &Task,
        checklist: &Checklist,
        index: usize,
        tracker: &StatusTracker,
    ) -> SubtaskRequest {
        let subtask = checklist[index].clone();
        let progress = tracker.render_progress(index);
        let instructions = build_instructions(&subtask, &task.description, &progress);
        let initial_url = (index == 0 && self.options.open_site_first)
            .then(|| site_url(&task.website))
            .flatten();

        SubtaskRequest {
            index,
            subtask,
            instructions,
            step_budget: self.options.max_actions_per_subtask,
            initial_url,
            sensitive_data: self.options.sensitive_data.clone(),
        }
    }

    async fn teardown(&self) {
        match self.session.stop().await {
            Ok(()) => tracing::info!("Browser session released"),
            Err(e) => tracing::warn!("Browser session teardown failed: {:#}", e),
        }
    }

    fn publish(&self, phase: RunPhase, ctx: &RunContext) {
        self.progress_tx.send_replace(RunProgress {
            phase,
            statuses: ctx.tracker.snapshot(),
            steps: ctx.trace.len(),
        });
    }
}

/// 站点标识转为可打开的 URL；缺少协议时补 https://
fn site_url(website: &str) -> Option<String> {
    let site = website.trim();
    if site.is_empty() {
        None
    } else if site.starts_with("http://") || site.starts_with("https://") {
        Some(site.to_string())
    } else {
        Some(format!("https://{}", site))
    }
}
