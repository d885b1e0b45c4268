//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WAGGLE__*` 覆盖（双下划线表示嵌套，如 `WAGGLE__AGENT__SUBTASK_TIMEOUT_SECS=90`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub browser: BrowserSection,
}

/// [app] 段：轨迹输出
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 轨迹输出根目录
    pub output_dir: PathBuf,
    /// 输出目录已存在且非空时跳过该任务
    pub skip_existing: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("trajectories"),
            skip_existing: true,
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：gemini / openai；没有对应 API Key 时回落到 Mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: None,
        }
    }
}

/// 子任务时限上限（一天）
pub const MAX_SUBTASK_TIMEOUT_SECS: f64 = 86_400.0;

/// [agent] 段：子任务时限、动作上限、首个子任务是否先打开站点、敏感数据占位符
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 单个子任务墙钟时限（秒，可为小数）
    pub subtask_timeout_secs: f64,
    pub max_actions_per_subtask: usize,
    pub open_site_first: bool,
    /// 占位符 -> 机密值（如登录凭据），只传给执行器
    pub sensitive_data: HashMap<String, String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            subtask_timeout_secs: 60.0,
            max_actions_per_subtask: 25,
            open_site_first: true,
            sensitive_data: HashMap::new(),
        }
    }
}

/// [browser] 段：Chrome 启动参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub headless: bool,
    pub sandbox: bool,
    pub extra_args: Vec<String>,
    pub user_agent: Option<String>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: false,
            extra_args: vec![
                "--disable-blink-features=AutomationControlled".into(),
                "--disable-web-security".into(),
                "--disable-notifications".into(),
            ],
            user_agent: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 WAGGLE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WAGGLE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WAGGLE")
            .separator("__")
            .try_parsing(true),
    );

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

impl AppConfig {
    /// 拒绝无法运行的取值：时限不在 (0, MAX_SUBTASK_TIMEOUT_SECS] 内、零动作上限
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let secs = self.agent.subtask_timeout_secs;
        if !(secs > 0.0 && secs <= MAX_SUBTASK_TIMEOUT_SECS) {
            return Err(config::ConfigError::Message(format!(
                "agent.subtask_timeout_secs must be in (0, {}] seconds, got {}",
                MAX_SUBTASK_TIMEOUT_SECS, secs
            )));
        }
        if self.agent.max_actions_per_subtask == 0 {
            return Err(config::ConfigError::Message(
                "agent.max_actions_per_subtask must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.subtask_timeout_secs, 60.0);
        assert_eq!(cfg.agent.max_actions_per_subtask, 25);
        assert_eq!(cfg.llm.provider, "gemini");
        assert!(cfg.browser.headless);
        assert_eq!(cfg.app.output_dir, PathBuf::from("trajectories"));
    }

    #[test]
    fn test_load_from_explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waggle.toml");
        std::fs::write(
            &path,
            r#"
[agent]
subtask_timeout_secs = 90.5
max_actions_per_subtask = 30

[agent.sensitive_data]
x_password = "secret"

[browser]
headless = false
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.subtask_timeout_secs, 90.5);
        assert_eq!(cfg.agent.max_actions_per_subtask, 30);
        assert!(cfg.agent.open_site_first);
        assert_eq!(cfg.agent.sensitive_data.get("x_password").map(String::as_str), Some("secret"));
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.browser.extra_args.len(), 3);
    }

    #[test]
    fn test_rejects_non_positive_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waggle.toml");
        std::fs::write(&path, "[agent]\nsubtask_timeout_secs = 0.0\n").unwrap();

        let err = load_config(Some(path)).unwrap_err();
        assert!(err.to_string().contains("subtask_timeout_secs"));
    }

    #[test]
    fn test_rejects_timeout_beyond_upper_bound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waggle.toml");
        std::fs::write(&path, "[agent]\nsubtask_timeout_secs = 1e20\n").unwrap();

        let err = load_config(Some(path)).unwrap_err();
        assert!(err.to_string().contains("subtask_timeout_secs"));

        let mut cfg = AppConfig::default();
        cfg.agent.subtask_timeout_secs = MAX_SUBTASK_TIMEOUT_SECS;
        assert!(cfg.validate().is_ok());
        cfg.agent.subtask_timeout_secs = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_action_budget() {
        let mut cfg = AppConfig::default();
        cfg.agent.max_actions_per_subtask = 0;
        assert!(cfg.validate().is_err());
        assert!(AppConfig::default().validate().is_ok());
    }
}
