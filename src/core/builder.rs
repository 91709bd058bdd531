//! 编排器构建器：按配置装配生成能力、检索能力、会话存储与策略参数
//!
//! 各外部能力都可以显式注入（测试 / 嵌入场景），未注入时按配置创建。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{load_config, AppConfig};
use crate::core::{EchoError, OrchestratorSettings, TurnOrchestrator};
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::lookup::{Lookup, NoopLookup, WebLookup};
use crate::refine::RefinementLoop;
use crate::store::{create_session_store, SessionStore};
use crate::tasks::{PromptTemplates, TaskExecutor};

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock LLM");
        return Arc::new(MockLlmClient);
    }
    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        let client = create_deepseek_client(&cfg.llm);
        tracing::info!("Using DeepSeek LLM ({})", client.model());
        Arc::new(client)
    } else if use_openai {
        let model = cfg
            .llm
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient)
    }
}

/// 按配置创建检索能力；未启用时为 NoopLookup
pub fn create_lookup_from_config(cfg: &AppConfig) -> Arc<dyn Lookup> {
    if cfg.lookup.enabled {
        tracing::info!(endpoint = %cfg.lookup.endpoint, "Using web lookup");
        Arc::new(WebLookup::new(&cfg.lookup))
    } else {
        Arc::new(NoopLookup)
    }
}

pub struct EchoBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    lookup: Option<Arc<dyn Lookup>>,
    store: Option<Arc<dyn SessionStore>>,
    prompts: Option<PromptTemplates>,
    task_timeout: Option<Duration>,
}

impl EchoBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            lookup: None,
            store: None,
            prompts: None,
            task_timeout: None,
        }
    }

    /// 加载配置（默认路径 + 可选文件 + ECHO__* 环境变量）后创建构建器
    pub fn from_config(config_path: Option<PathBuf>) -> Result<Self, EchoError> {
        Ok(Self::new(load_config(config_path)?))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn Lookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// 覆盖配置中的单任务生成超时
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn settings(&self) -> OrchestratorSettings {
        let cfg = &self.config;
        OrchestratorSettings {
            mood_threshold: cfg.orchestrator.mood_threshold,
            crisis_policy: cfg.orchestrator.crisis_policy,
            cadence: cfg.orchestrator.report.cadence(),
            history_window: cfg.app.history_window,
        }
    }

    pub fn build(self) -> Result<TurnOrchestrator, EchoError> {
        let settings = self.settings();
        let cfg = self.config;

        let llm = self.llm.unwrap_or_else(|| create_llm_from_config(&cfg));
        let lookup = self.lookup.unwrap_or_else(|| create_lookup_from_config(&cfg));
        let store = match self.store {
            Some(store) => store,
            None => create_session_store(&cfg.store)?,
        };
        let prompts = self
            .prompts
            .unwrap_or_else(|| PromptTemplates::load(&cfg.app.prompts_dir));
        let timeout = self
            .task_timeout
            .unwrap_or_else(|| Duration::from_secs(cfg.llm.timeouts.request));

        let executor = Arc::new(TaskExecutor::with_timeout(llm, prompts, timeout));
        let refiner = RefinementLoop::new(Arc::clone(&executor), lookup)
            .with_max_iterations(cfg.refine.max_iterations)
            .with_trusted_domain(cfg.refine.trusted_domain.clone())
            .with_lookup_timeout(Duration::from_secs(cfg.lookup.timeout_secs));

        tracing::info!(
            mood_threshold = settings.mood_threshold,
            crisis_policy = ?settings.crisis_policy,
            cadence = ?settings.cadence,
            max_iterations = refiner.max_iterations(),
            "orchestrator ready"
        );
        Ok(TurnOrchestrator::new(executor, refiner, store, settings))
    }
}
