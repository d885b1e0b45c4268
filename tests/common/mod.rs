//! 集成测试共用的假会话、脚本化执行器与固定规划器

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use waggle::browser::{BrowserSession, OpenTab, TabHandle};
use waggle::checklist::ChecklistPlanner;
use waggle::core::SessionSupervisor;
use waggle::subtask::{ActionResult, ExecutionStep, StepExecutor, StepHistory, SubtaskRequest};
use waggle::{AgentError, Checklist, Task};

#[derive(Default)]
struct FakeState {
    starts: usize,
    stops: usize,
    tabs: Vec<OpenTab>,
    next_seq: u64,
    close_attempts: Vec<String>,
    active: Option<TabHandle>,
    fail_start: bool,
    fail_list: bool,
    fail_close: bool,
}

/// 内存中的浏览器会话：记录启动 / 停止次数与标签页变化
#[derive(Default)]
pub struct FakeSession {
    state: Mutex<FakeState>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_start() -> Self {
        let s = Self::default();
        s.state.lock().unwrap().fail_start = true;
        s
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.state.lock().unwrap().fail_close = fail;
    }

    /// 打开新标签页，顺序号递增
    pub fn open_tab(&self) -> TabHandle {
        let mut st = self.state.lock().unwrap();
        st.next_seq += 1;
        let handle = TabHandle::new(format!("tab-{}", st.next_seq), st.next_seq);
        st.tabs.push(OpenTab {
            handle: handle.clone(),
            closed: false,
        });
        handle
    }

    /// 按给定顺序号插入标签页（列表位置与顺序号无关）
    pub fn insert_tab(&self, id: &str, seq: u64, closed: bool) {
        self.state.lock().unwrap().tabs.push(OpenTab {
            handle: TabHandle::new(id, seq),
            closed,
        });
    }

    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    pub fn open_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tabs
            .iter()
            .filter(|t| !t.closed)
            .map(|t| t.handle.id.clone())
            .collect()
    }

    pub fn close_attempts(&self) -> Vec<String> {
        self.state.lock().unwrap().close_attempts.clone()
    }

    pub fn active(&self) -> Option<TabHandle> {
        self.state.lock().unwrap().active.clone()
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn start(&self) -> anyhow::Result<()> {
        let mut st = self.state.lock().unwrap();
        st.starts += 1;
        if st.fail_start {
            return Err(anyhow!("chrome binary not found"));
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.state.lock().unwrap().stops += 1;
        Ok(())
    }

    async fn list_open_tabs(&self) -> anyhow::Result<Vec<OpenTab>> {
        let st = self.state.lock().unwrap();
        if st.fail_list {
            return Err(anyhow!("connection lost"));
        }
        Ok(st.tabs.clone())
    }

    async fn close_tab(&self, tab: &TabHandle) -> anyhow::Result<()> {
        let mut st = self.state.lock().unwrap();
        st.close_attempts.push(tab.id.clone());
        if st.fail_close {
            return Err(anyhow!("tab {} already gone", tab.id));
        }
        st.tabs.retain(|t| t.handle.id != tab.id);
        Ok(())
    }

    async fn set_active_page(&self, tab: Option<&TabHandle>) -> anyhow::Result<()> {
        self.state.lock().unwrap().active = tab.cloned();
        Ok(())
    }
}

/// 单个子任务的脚本
pub enum Script {
    /// 打开 tabs 个标签页并返回 steps 步（最后一步 DONE）
    Steps { steps: usize, tabs: usize },
    /// 睡眠后返回一步
    Sleep(Duration),
    /// 执行器内部报错
    Fail(String),
    /// 取消整次运行，然后挂起
    CancelRun(SessionSupervisor),
}

/// 执行器被调用时看到的参数
#[derive(Debug, Clone)]
pub struct Call {
    pub index: usize,
    pub subtask: String,
    pub instructions: String,
    pub active_page: Option<TabHandle>,
    pub initial_url: Option<String>,
    pub step_budget: usize,
}

pub struct ScriptedExecutor {
    scripts: Vec<Script>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedExecutor {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn step(label: String, done: bool) -> ExecutionStep {
    ExecutionStep {
        screenshot: None,
        model_output: Some(label),
        results: vec![if done { ActionResult::done() } else { ActionResult::ok() }],
    }
}

#[async_trait]
impl StepExecutor<FakeSession> for ScriptedExecutor {
    async fn run(
        &self,
        request: &SubtaskRequest,
        session: &FakeSession,
        active_page: Option<&TabHandle>,
    ) -> anyhow::Result<StepHistory> {
        self.calls.lock().unwrap().push(Call {
            index: request.index,
            subtask: request.subtask.clone(),
            instructions: request.instructions.clone(),
            active_page: active_page.cloned(),
            initial_url: request.initial_url.clone(),
            step_budget: request.step_budget,
        });

        match self.scripts.get(request.index) {
            Some(Script::Steps { steps, tabs }) => {
                for _ in 0..*tabs {
                    session.open_tab();
                }
                Ok((0..*steps)
                    .map(|k| step(format!("s{}-{}", request.index, k), k + 1 == *steps))
                    .collect())
            }
            Some(Script::Sleep(d)) => {
                tokio::time::sleep(*d).await;
                Ok(vec![step(format!("s{}-late", request.index), true)])
            }
            Some(Script::Fail(msg)) => Err(anyhow!("{}", msg)),
            Some(Script::CancelRun(supervisor)) => {
                supervisor.cancel();
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Vec::new())
            }
            None => Err(anyhow!("no script for subtask {}", request.index)),
        }
    }
}

/// 返回固定清单（或固定错误）的规划器
pub struct FixedPlanner {
    steps: Result<Vec<String>, String>,
    calls: AtomicUsize,
}

impl FixedPlanner {
    pub fn new(steps: &[&str]) -> Self {
        Self {
            steps: Ok(steps.iter().map(|s| s.to_string()).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            steps: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChecklistPlanner for FixedPlanner {
    async fn plan(&self, _task: &Task) -> Result<Checklist, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.steps {
            Ok(steps) => Checklist::new(steps.clone())
                .ok_or_else(|| AgentError::Planning("empty checklist".to_string())),
            Err(msg) => Err(AgentError::Planning(msg.clone())),
        }
    }
}
