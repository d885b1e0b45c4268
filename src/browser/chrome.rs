//! Headless Chrome 会话
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! headless_chrome 是同步 API，所有调用都放进 spawn_blocking。
//! 底层不直接暴露标签页的创建顺序，这里为每个首次见到的 target id 分配递增的顺序号，
//! 交接时据此判断「最新」的标签页。

use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};

use crate::browser::{BrowserSession, OpenTab, TabHandle};
use crate::config::BrowserSection;

/// Chrome 启动参数
#[derive(Debug, Clone)]
pub struct ChromeSessionOptions {
    pub headless: bool,
    pub sandbox: bool,
    pub extra_args: Vec<String>,
    pub user_agent: Option<String>,
    /// 浏览器无事件多久后断开（LLM 长调用期间需保持连接）
    pub idle_timeout: Duration,
}

impl From<&BrowserSection> for ChromeSessionOptions {
    fn from(cfg: &BrowserSection) -> Self {
        Self {
            headless: cfg.headless,
            sandbox: cfg.sandbox,
            extra_args: cfg.extra_args.clone(),
            user_agent: cfg.user_agent.clone(),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl ChromeSessionOptions {
    fn launch_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.extra_args.iter().map(OsString::from).collect();
        if let Some(ua) = &self.user_agent {
            args.push(OsString::from(format!("--user-agent={}", ua)));
        }
        args
    }
}

/// 运行中的浏览器及标签页顺序号
struct ChromeState {
    browser: Browser,
    seqs: HashMap<String, u64>,
    next_seq: u64,
    active: Option<String>,
}

impl ChromeState {
    /// 当前标签页列表；首次见到的标签页按列表顺序分配顺序号，已消失的从表中移除
    fn tabs(&mut self) -> anyhow::Result<Vec<(TabHandle, Arc<Tab>)>> {
        let tabs: Vec<Arc<Tab>> = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| anyhow!("tab list poisoned: {}", e))?
            .clone();

        let live: Vec<String> = tabs.iter().map(|t| t.get_target_id().clone()).collect();
        self.seqs.retain(|id, _| live.contains(id));

        let mut out = Vec::with_capacity(tabs.len());
        for tab in tabs {
            let id = tab.get_target_id().clone();
            let seq = match self.seqs.get(&id) {
                Some(seq) => *seq,
                None => {
                    self.next_seq += 1;
                    self.seqs.insert(id.clone(), self.next_seq);
                    self.next_seq
                }
            };
            out.push((TabHandle::new(id, seq), tab));
        }
        Ok(out)
    }

    fn find(&mut self, id: &str) -> anyhow::Result<Option<Arc<Tab>>> {
        Ok(self
            .tabs()?
            .into_iter()
            .find(|(h, _)| h.id == id)
            .map(|(_, tab)| tab))
    }

    fn open(&mut self) -> anyhow::Result<Arc<Tab>> {
        let tab = self.browser.new_tab()?;
        // 触发顺序号分配
        self.tabs()?;
        self.active = Some(tab.get_target_id().clone());
        Ok(tab)
    }
}

/// 起始标签页 id：调用方指定的优先，其次是会话记录的活动页
fn preferred_tab_id(requested: Option<&TabHandle>, active: Option<&str>) -> Option<String> {
    requested
        .map(|h| h.id.clone())
        .or_else(|| active.map(String::from))
}

/// 基于 Headless Chrome 的共享浏览器会话
pub struct ChromeSession {
    options: ChromeSessionOptions,
    state: Arc<Mutex<Option<ChromeState>>>,
}

impl ChromeSession {
    pub fn new(options: ChromeSessionOptions) -> Self {
        Self {
            options,
            state: Arc::new(Mutex::new(None)),
        }
    }

    /// 在已启动的会话上执行同步操作
    async fn with_state<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut ChromeState) -> anyhow::Result<T> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        blocking(move || {
            let mut guard = state.lock().map_err(|e| anyhow!("session poisoned: {}", e))?;
            let st = guard
                .as_mut()
                .ok_or_else(|| anyhow!("browser session not started"))?;
            f(st)
        })
        .await
    }

    /// 子任务的起始标签页：指定页或会话活动页仍存在则用它，否则新开一个
    pub async fn resolve_tab(&self, active: Option<&TabHandle>) -> anyhow::Result<Arc<Tab>> {
        let active = active.cloned();
        self.with_state(move |st| {
            if let Some(id) = preferred_tab_id(active.as_ref(), st.active.as_deref()) {
                if let Some(tab) = st.find(&id)? {
                    return Ok(tab);
                }
            }
            st.open()
        })
        .await
    }

    /// 新开标签页（执行器受阻时用于搜索）
    pub async fn open_tab(&self) -> anyhow::Result<Arc<Tab>> {
        self.with_state(|st| st.open()).await
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn start(&self) -> anyhow::Result<()> {
        let state = Arc::clone(&self.state);
        let opts = self.options.clone();
        blocking(move || {
            let mut guard = state.lock().map_err(|e| anyhow!("session poisoned: {}", e))?;
            if guard.is_some() {
                return Ok(());
            }

            let args = opts.launch_args();
            let launch = LaunchOptions::default_builder()
                .headless(opts.headless)
                .sandbox(opts.sandbox)
                .idle_browser_timeout(opts.idle_timeout)
                .args(args.iter().map(|a| a.as_os_str()).collect())
                .build()
                .map_err(|e| anyhow!("invalid launch options: {}", e))?;
            let browser =
                Browser::new(launch).map_err(|e| anyhow!("Chrome launch failed: {}", e))?;

            tracing::info!(headless = opts.headless, "Chrome started");
            *guard = Some(ChromeState {
                browser,
                seqs: HashMap::new(),
                next_seq: 0,
                active: None,
            });
            Ok(())
        })
        .await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let state = Arc::clone(&self.state);
        blocking(move || {
            let mut guard = state.lock().map_err(|e| anyhow!("session poisoned: {}", e))?;
            // Browser 在 drop 时结束 Chrome 进程
            if guard.take().is_some() {
                tracing::info!("Chrome stopped");
            }
            Ok(())
        })
        .await
    }

    async fn list_open_tabs(&self) -> anyhow::Result<Vec<OpenTab>> {
        self.with_state(|st| {
            Ok(st
                .tabs()?
                .into_iter()
                .map(|(handle, _)| OpenTab {
                    handle,
                    closed: false,
                })
                .collect())
        })
        .await
    }

    async fn close_tab(&self, tab: &TabHandle) -> anyhow::Result<()> {
        let handle = tab.clone();
        self.with_state(move |st| {
            let tab = st
                .find(&handle.id)?
                .ok_or_else(|| anyhow!("tab {} already closed", handle.id))?;
            tab.close(true)?;
            st.seqs.remove(&handle.id);
            Ok(())
        })
        .await
    }

    async fn set_active_page(&self, tab: Option<&TabHandle>) -> anyhow::Result<()> {
        let handle = tab.cloned();
        self.with_state(move |st| {
            match handle {
                Some(handle) => {
                    let tab = st
                        .find(&handle.id)?
                        .ok_or_else(|| anyhow!("tab {} vanished before activation", handle.id))?;
                    tab.activate()?;
                    st.active = Some(handle.id);
                }
                None => st.active = None,
            }
            Ok(())
        })
        .await
    }
}

/// 在阻塞线程池中执行同步闭包
pub(crate) async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("Task join: {}", e))?
}
