//! 会话交接（Session Continuity Manager）
//!
//! 子任务之间收敛到唯一一个标签页：保留打开顺序最新的那一个，其余尽力关闭，
//! 然后把它设为下一个子任务的活动页。没有标签页时返回 None，下一个子任务从空白开始。

use crate::browser::{BrowserSession, TabHandle};
use crate::core::AgentError;

/// 关闭除最新标签页外的全部标签页，并返回最新的那一个
///
/// 关闭失败（标签页已自行消失）只记 debug 日志；列出标签页或设置活动页失败视为会话丢失。
pub async fn handoff<S>(session: &S) -> Result<Option<TabHandle>, AgentError>
where
    S: BrowserSession + ?Sized,
{
    let mut tabs: Vec<TabHandle> = session
        .list_open_tabs()
        .await
        .map_err(|e| AgentError::Session(format!("list tabs failed: {:#}", e)))?
        .into_iter()
        .filter(|t| !t.closed)
        .map(|t| t.handle)
        .collect();

    tabs.sort_by_key(|t| t.opened_seq);
    let Some(last) = tabs.pop() else {
        tracing::debug!("no open tabs left, next subtask starts fresh");
        session
            .set_active_page(None)
            .await
            .map_err(|e| AgentError::Session(format!("set active page failed: {:#}", e)))?;
        return Ok(None);
    };

    for tab in &tabs {
        match session.close_tab(tab).await {
            Ok(()) => tracing::debug!(tab = %tab.id, "closed stale tab"),
            Err(e) => tracing::debug!(tab = %tab.id, "tab already gone: {:#}", e),
        }
    }

    session
        .set_active_page(Some(&last))
        .await
        .map_err(|e| AgentError::Session(format!("set active page failed: {:#}", e)))?;

    tracing::debug!(tab = %last.id, closed = tabs.len(), "handed off to newest tab");
    Ok(Some(last))
}
