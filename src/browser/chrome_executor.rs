//! Chrome 子任务执行器：LLM 驱动的单子任务循环
//!
//! 每一步：截图 + 语义快照（无障碍树）-> LLM 选一个动作 -> 执行 -> 记录 ExecutionStep。
//! 语义快照中每个可交互元素带引用编号（[1], [2] ...），LLM 用编号点击或输入。
//! 动作：navigate / click / type / scroll / open_tab / done；关闭标签页只由会话交接负责。

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::protocol::cdp::DOM::{self, BackendNodeId};
use headless_chrome::{Element, Tab};
use serde::Deserialize;
use url::form_urlencoded;

use crate::browser::chrome::blocking;
use crate::browser::{ChromeSession, TabHandle};
use crate::llm::{extract_json_block, LlmClient, Message};
use crate::subtask::{ActionResult, ExecutionStep, ScreenshotRef, StepExecutor, StepHistory, SubtaskRequest};

const SEARCH_URL: &str = "https://www.google.com/search?q=";

/// 保留的最近对话条数（不含 system）
const MAX_HISTORY_MESSAGES: usize = 8;

const ACTION_PROTOCOL: &str = r#"You control a web browser one action at a time.
Each turn you receive the current URL, title and a semantic snapshot where interactive
elements are marked [1], [2], ... Reply with ONE JSON object and nothing else:

{"thought": "...", "action": "navigate", "url": "https://..."}
{"thought": "...", "action": "click", "ref": 3}
{"thought": "...", "action": "type", "ref": 2, "text": "query"}
{"thought": "...", "action": "scroll", "direction": "down"}
{"thought": "...", "action": "open_tab", "query": "search keywords"}
{"thought": "...", "action": "done", "result": "answer or summary"}

Secrets appear as <secret>name</secret> placeholders; type them verbatim."#;

/// LLM 选择的动作
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
enum BrowserAction {
    Navigate {
        url: String,
    },
    Click {
        #[serde(rename = "ref")]
        ref_id: usize,
    },
    Type {
        #[serde(rename = "ref")]
        ref_id: usize,
        text: String,
    },
    Scroll {
        direction: Option<String>,
    },
    OpenTab {
        query: Option<String>,
        url: Option<String>,
    },
    Done {
        result: Option<String>,
    },
}

fn parse_action(output: &str) -> Result<BrowserAction, String> {
    let json = extract_json_block(output).ok_or_else(|| "no JSON action in model output".to_string())?;
    serde_json::from_str(json).map_err(|e| format!("invalid action: {}", e))
}

/// 判断角色是否为可交互元素
fn is_interactive_role(role: &str) -> bool {
    matches!(
        role.to_lowercase().as_str(),
        "button"
            | "link"
            | "textbox"
            | "checkbox"
            | "radio"
            | "combobox"
            | "listbox"
            | "menuitem"
            | "option"
            | "searchbox"
            | "slider"
            | "spinbutton"
            | "switch"
            | "tab"
            | "treeitem"
    )
}

/// 把 `<secret>name</secret>` 替换为配置的值
fn fill_secrets(text: &str, secrets: &HashMap<String, String>) -> String {
    secrets.iter().fold(text.to_string(), |acc, (name, value)| {
        acc.replace(&format!("<secret>{}</secret>", name), value)
    })
}

/// 语义快照：给 LLM 的行 + 引用编号 -> backend DOM 节点
#[derive(Debug, Default)]
struct Snapshot {
    lines: Vec<String>,
    element_map: HashMap<usize, BackendNodeId>,
}

/// 为无障碍树节点（role, name, backend 节点）编号
///
/// 只有可交互且带 backend 节点的元素占用编号，编号与 element_map 一一对应。
fn index_nodes<'a, I>(nodes: I) -> Snapshot
where
    I: IntoIterator<Item = (&'a str, &'a str, Option<BackendNodeId>)>,
{
    let mut snapshot = Snapshot::default();
    for (role, name, backend_id) in nodes {
        if matches!(role, "none" | "unknown" | "generic") {
            continue;
        }
        let mut line = match backend_id {
            Some(id) if is_interactive_role(role) => {
                let ref_id = snapshot.element_map.len() + 1;
                snapshot.element_map.insert(ref_id, id);
                format!("[{}] {}", ref_id, role)
            }
            _ => role.to_string(),
        };
        if !name.is_empty() {
            line.push_str(&format!(": \"{}\"", name));
        }
        snapshot.lines.push(line);
    }
    snapshot
}

/// 一次观察：截图 + 供 LLM 阅读的页面描述 + 编号到节点的映射
struct Observation {
    screenshot: Option<String>,
    text: String,
    element_map: HashMap<usize, BackendNodeId>,
}

fn observe(tab: &Arc<Tab>, max_chars: usize) -> anyhow::Result<Observation> {
    let screenshot = match tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true) {
        Ok(bytes) => Some(BASE64.encode(bytes)),
        Err(e) => {
            tracing::debug!("screenshot failed: {}", e);
            None
        }
    };

    let url = tab.get_url();
    let title = tab.get_title().unwrap_or_default();
    let ax_tree = tab.call_method(headless_chrome::protocol::cdp::Accessibility::GetFullAXTree {
        depth: Some(10),
        frame_id: None,
    })?;

    let snapshot = index_nodes(ax_tree.nodes.iter().map(|node| {
        let role = node
            .role
            .as_ref()
            .and_then(|r| r.value.as_ref())
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let name = node
            .name
            .as_ref()
            .and_then(|n| n.value.as_ref())
            .and_then(|v| v.as_str())
            .unwrap_or("");
        (role, name, node.backend_dom_node_id)
    }));

    let mut text = format!(
        "# {}\nURL: {}\n\n## Semantic Snapshot\n{}",
        title,
        url,
        snapshot.lines.join("\n")
    );
    if text.chars().count() > max_chars {
        text = text.chars().take(max_chars).collect::<String>() + "\n...[truncated]";
    }

    Ok(Observation {
        screenshot,
        text,
        element_map: snapshot.element_map,
    })
}

/// 由 backend 节点得到可操作的 Element
fn resolve_element(tab: &Tab, backend_id: BackendNodeId) -> anyhow::Result<Element<'_>> {
    // PushNodesByBackendIdsToFrontend 需要先请求过文档
    tab.get_document()?;
    let pushed = tab.call_method(DOM::PushNodesByBackendIdsToFrontend {
        backend_node_ids: vec![backend_id],
    })?;
    let node_id = pushed
        .node_ids
        .first()
        .copied()
        .filter(|id| *id != 0)
        .ok_or_else(|| anyhow!("node {} is no longer in the document", backend_id))?;
    Element::new(tab, node_id)
}

fn click_node(tab: &Arc<Tab>, backend_id: BackendNodeId) -> anyhow::Result<()> {
    resolve_element(tab, backend_id)?.click()?;
    Ok(())
}

const SET_VALUE_FN: &str = r#"function(text) {
    this.scrollIntoView({ behavior: 'instant', block: 'center' });
    this.focus();
    if ('value' in this) {
        this.value = text;
        this.dispatchEvent(new Event('input', { bubbles: true }));
        this.dispatchEvent(new Event('change', { bubbles: true }));
    } else {
        this.textContent = text;
        this.dispatchEvent(new Event('input', { bubbles: true }));
    }
}"#;

fn type_into_node(tab: &Arc<Tab>, backend_id: BackendNodeId, text: &str) -> anyhow::Result<()> {
    resolve_element(tab, backend_id)?.call_js_fn(
        SET_VALUE_FN,
        vec![serde_json::Value::String(text.to_string())],
        false,
    )?;
    Ok(())
}

/// open_tab 的搜索地址；查询词做 URL 编码
fn search_url(query: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(query.trim().as_bytes()).collect();
    format!("{}{}", SEARCH_URL, encoded)
}

fn navigate(tab: &Arc<Tab>, url: &str) -> anyhow::Result<()> {
    tab.navigate_to(url)?;
    tab.wait_until_navigated()?;
    Ok(())
}

/// 基于 Headless Chrome + LLM 的 step executor
pub struct ChromeStepExecutor {
    llm: Arc<dyn LlmClient>,
    max_snapshot_chars: usize,
}

impl ChromeStepExecutor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            max_snapshot_chars: 8000,
        }
    }

    pub fn with_max_snapshot_chars(mut self, chars: usize) -> Self {
        self.max_snapshot_chars = chars;
        self
    }

    /// 执行一个动作；返回动作结果，open_tab 时切换当前标签页
    async fn apply(
        &self,
        session: &ChromeSession,
        tab: &mut Arc<Tab>,
        action: BrowserAction,
        element_map: &HashMap<usize, BackendNodeId>,
        secrets: &HashMap<String, String>,
    ) -> ActionResult {
        let target_node = match &action {
            BrowserAction::Click { ref_id } | BrowserAction::Type { ref_id, .. } => {
                match element_map.get(ref_id) {
                    Some(node) => Some(*node),
                    None => return ActionResult::failed(format!("element [{}] not in snapshot", ref_id)),
                }
            }
            _ => None,
        };

        let current = Arc::clone(tab);
        let outcome = match (action, target_node) {
            (BrowserAction::Done { result }, _) => return ActionResult::done_with(result),
            (BrowserAction::Navigate { url }, _) => {
                tracing::info!(url = %url, "browser navigate");
                blocking(move || navigate(&current, &url)).await
            }
            (BrowserAction::Click { .. }, Some(node)) => blocking(move || click_node(&current, node)).await,
            (BrowserAction::Type { text, .. }, Some(node)) => {
                let text = fill_secrets(&text, secrets);
                blocking(move || type_into_node(&current, node, &text)).await
            }
            (BrowserAction::Click { ref_id } | BrowserAction::Type { ref_id, .. }, None) => {
                Err(anyhow!("element [{}] not in snapshot", ref_id))
            }
            (BrowserAction::Scroll { direction }, _) => {
                let amount = if direction.as_deref() == Some("up") { -500 } else { 500 };
                blocking(move || {
                    current.evaluate(&format!("window.scrollBy(0, {})", amount), false)?;
                    Ok(())
                })
                .await
            }
            (BrowserAction::OpenTab { query, url }, _) => {
                let target = url.or_else(|| query.map(|q| search_url(&q)));
                match session.open_tab().await {
                    Ok(new_tab) => {
                        *tab = Arc::clone(&new_tab);
                        match target {
                            Some(target) => blocking(move || navigate(&new_tab, &target)).await,
                            None => Ok(()),
                        }
                    }
                    Err(e) => Err(e),
                }
            }
        };

        match outcome {
            Ok(()) => ActionResult::ok(),
            Err(e) => ActionResult::failed(format!("{:#}", e)),
        }
    }
}

#[async_trait]
impl StepExecutor<ChromeSession> for ChromeStepExecutor {
    async fn run(
        &self,
        request: &SubtaskRequest,
        session: &ChromeSession,
        active_page: Option<&TabHandle>,
    ) -> anyhow::Result<StepHistory> {
        let mut tab = session.resolve_tab(active_page).await?;

        if let Some(url) = request.initial_url.clone() {
            let start = Arc::clone(&tab);
            blocking(move || navigate(&start, &url)).await?;
        }

        let system = Message::system(format!("{}\n\n{}", ACTION_PROTOCOL, request.instructions));
        let mut conversation: Vec<Message> = Vec::new();
        let mut history = Vec::new();

        for _ in 0..request.step_budget {
            let current = Arc::clone(&tab);
            let max_chars = self.max_snapshot_chars;
            let observation = blocking(move || observe(&current, max_chars)).await?;

            conversation.push(Message::user(observation.text));
            if conversation.len() > MAX_HISTORY_MESSAGES {
                conversation.drain(..conversation.len() - MAX_HISTORY_MESSAGES);
            }
            let mut messages = vec![system.clone()];
            messages.extend(conversation.iter().cloned());

            let output = self
                .llm
                .complete(&messages)
                .await
                .map_err(|e| anyhow!("LLM error: {}", e))?;
            conversation.push(Message::assistant(output.clone()));

            let result = match parse_action(&output) {
                Ok(action) => {
                    self.apply(
                        session,
                        &mut tab,
                        action,
                        &observation.element_map,
                        &request.sensitive_data,
                    )
                    .await
                }
                Err(e) => ActionResult::failed(e),
            };
            let done = result.is_done;

            history.push(ExecutionStep {
                screenshot: observation.screenshot.map(ScreenshotRef::Base64),
                model_output: Some(output),
                results: vec![result],
            });
            if done {
                break;
            }
        }

        if !history.last().map(|s| s.results.iter().any(|r| r.is_done)).unwrap_or(false) {
            tracing::warn!(index = request.index, "step budget exhausted before DONE");
        }
        Ok(history)
    }
}
