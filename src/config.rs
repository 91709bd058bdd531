//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ECHO__*` 覆盖（双下划线表示嵌套，如 `ECHO__LLM__PROVIDER=openai`）。
//! 所有字段都有默认值，空配置即可运行（Mock LLM + SQLite 会话库）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::{CrisisPolicy, ReportCadence};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
    pub refine: RefineSection,
    pub lookup: LookupSection,
    pub store: StoreSection,
}

/// [app] 段：应用名、CLI 默认用户、对话窗口、提示词目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// echo CLI 使用的 user_id
    pub default_user: String,
    /// SessionState 中保留、并传给各任务的最近消息条数
    pub history_window: usize,
    /// 提示词覆盖目录，文件名为 `<任务名>.txt`
    pub prompts_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            default_user: "local".to_string(),
            history_window: 10,
            prompts_dir: PathBuf::from("config/prompts"),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；有 API Key 时才会真正启用 deepseek / openai
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次任务生成超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 30 }
    }
}

/// [orchestrator] 段：低情绪阈值、危机策略、周报节奏
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 情绪分低于此值（0-10）时追加应对策略
    pub mood_threshold: u8,
    pub crisis_policy: CrisisPolicy,
    pub report: ReportSection,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            mood_threshold: 6,
            crisis_policy: CrisisPolicy::Exclusive,
            report: ReportSection::default(),
        }
    }
}

/// 周报触发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    Messages,
    Days,
}

/// [orchestrator.report] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub mode: ReportMode,
    pub every_messages: u64,
    pub every_days: i64,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            mode: ReportMode::Messages,
            every_messages: 7,
            every_days: 7,
        }
    }
}

impl ReportSection {
    pub fn cadence(&self) -> ReportCadence {
        match self.mode {
            ReportMode::Messages => ReportCadence::EveryMessages(self.every_messages.max(1)),
            ReportMode::Days => ReportCadence::EveryDays(self.every_days.max(1)),
        }
    }
}

/// [refine] 段：应对策略精炼循环
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefineSection {
    /// 检查轮数上限（至少 1）
    pub max_iterations: usize,
    /// 检索查询限定的可信来源
    pub trusted_domain: String,
}

impl Default for RefineSection {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            trusted_domain: "helpguide.org".to_string(),
        }
    }
}

/// [lookup] 段：检索端点、超时、结果大小限制、端点域名白名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LookupSection {
    pub enabled: bool,
    /// 返回 HTML 结果页的搜索端点
    pub endpoint: String,
    pub query_param: String,
    pub allowed_domains: Vec<String>,
    pub timeout_secs: u64,
    pub max_snippets: usize,
    pub max_result_chars: usize,
}

impl Default for LookupSection {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://html.duckduckgo.com/html/".to_string(),
            query_param: "q".to_string(),
            allowed_domains: vec![
                "html.duckduckgo.com".into(),
                "www.helpguide.org".into(),
                "helpguide.org".into(),
            ],
            timeout_secs: 15,
            max_snippets: 5,
            max_result_chars: 8000,
        }
    }
}

/// 会话存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

/// [store] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: PathBuf::from("sessions.db"),
        }
    }
}

/// 从 config 目录加载配置，环境变量 ECHO__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ECHO__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("ECHO")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
