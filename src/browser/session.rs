//! 浏览器会话边界
//!
//! 编排器只需要四种能力：启动 / 停止、列出标签页、关闭标签页、指定活动页。
//! 标签页以 TabHandle 表示（仅是「关系」而非所有权），带有打开顺序号 opened_seq，
//! 「保留最新标签页」规则按这个顺序号比较，而不依赖底层运行时的列表顺序。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 标签页引用：底层 id + 打开顺序号（越大越新）
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabHandle {
    pub id: String,
    pub opened_seq: u64,
}

impl TabHandle {
    pub fn new(id: impl Into<String>, opened_seq: u64) -> Self {
        Self {
            id: id.into(),
            opened_seq,
        }
    }
}

/// list_open_tabs 的单项：可能在列出之后、处理之前就已被关闭
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenTab {
    pub handle: TabHandle,
    pub closed: bool,
}

/// 单个运行独占的共享浏览器会话
///
/// 所有方法都取 `&self`：会话在整次运行中只有编排器一个所有者，
/// 以引用借给当次的子任务执行，内部可变性由实现自行负责。
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// 启动会话（浏览器进程 / 上下文）
    async fn start(&self) -> anyhow::Result<()>;

    /// 停止会话并释放底层自动化句柄；需可重复调用
    async fn stop(&self) -> anyhow::Result<()>;

    /// 列出当前已知的标签页
    async fn list_open_tabs(&self) -> anyhow::Result<Vec<OpenTab>>;

    /// 关闭一个标签页；标签页已消失时返回 Err，由调用方决定是否忽略
    async fn close_tab(&self, tab: &TabHandle) -> anyhow::Result<()>;

    /// 指定下一个子任务开始时所在的活动页；None 表示从空白开始
    async fn set_active_page(&self, tab: Option<&TabHandle>) -> anyhow::Result<()>;
}
