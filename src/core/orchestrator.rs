//! 轮次编排器：每条用户消息的主控流程
//!
//! 加载 / 初始化状态并计数 → 并发运行危机、共情、情绪三个任务并等待全部完成 →
//! 按优先级合并：危机优先 → 低情绪时共情 + 应对策略，否则仅共情 → 周期性周报 →
//! 持久化状态 → 返回有序片段。任务失败就地降级，只有存储失败会让整轮失败（返回「请重试」，
//! 已确定的危机片段仍排在它前面）。

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::{
    EchoError, Fragment, ReportCadence, SessionState, SessionSupervisor, TurnResult,
};
use crate::refine::RefinementLoop;
use crate::store::SessionStore;
use crate::tasks::{crisis, TaskContext, TaskExecutor, TaskKind};

/// 片段来源：应对策略循环
pub const COPING_SOURCE: &str = "coping_loop";
/// 片段来源：兜底陪伴语
pub const FALLBACK_SOURCE: &str = "fallback";
/// 片段来源：系统提示（存储失败）
pub const SYSTEM_SOURCE: &str = "system";

/// 本轮没有任何可发内容时的陪伴语
pub const PRESENCE_FALLBACK: &str = "I'm right here with you. You're not alone.";
/// 存储失败时返回给用户的通用提示
pub const RETRY_MESSAGE: &str =
    "I'm having trouble right now and couldn't save our conversation. Please try again in a moment.";

/// 一轮未能完成：已确定的危机片段仍要在「请重试」之前发出
#[derive(Error, Debug)]
#[error("{error}")]
pub struct FailedTurn {
    pub error: EchoError,
    pub crisis: Option<Fragment>,
}

impl FailedTurn {
    fn new(error: impl Into<EchoError>, crisis: Option<Fragment>) -> Self {
        Self {
            error: error.into(),
            crisis,
        }
    }

    /// 失败时的回复：危机片段（若有）在前，随后是「请重试」
    pub fn fragments(self) -> Vec<Fragment> {
        let mut fragments: Vec<Fragment> = self.crisis.into_iter().collect();
        fragments.push(Fragment::new(SYSTEM_SOURCE, RETRY_MESSAGE));
        fragments
    }
}

/// 检测到危机时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisPolicy {
    /// 只发危机消息，本轮结束
    #[default]
    Exclusive,
    /// 危机消息在前，之后照常走共情 / 应对 / 周报
    FollowThrough,
}

/// 编排策略参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub mood_threshold: u8,
    pub crisis_policy: CrisisPolicy,
    pub cadence: ReportCadence,
    pub history_window: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            mood_threshold: 6,
            crisis_policy: CrisisPolicy::Exclusive,
            cadence: ReportCadence::EveryMessages(7),
            history_window: 10,
        }
    }
}

pub struct TurnOrchestrator {
    executor: Arc<TaskExecutor>,
    refiner: RefinementLoop,
    store: Arc<dyn SessionStore>,
    supervisor: SessionSupervisor,
    settings: OrchestratorSettings,
}

impl TurnOrchestrator {
    pub fn new(
        executor: Arc<TaskExecutor>,
        refiner: RefinementLoop,
        store: Arc<dyn SessionStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            executor,
            refiner,
            store,
            supervisor: SessionSupervisor::new(),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.executor.token_usage()
    }

    /// 处理一轮：总会返回至少一个片段；存储失败时为危机片段（若有）+「请重试」提示
    pub async fn process_turn(&self, user_id: &str, message: &str) -> TurnResult {
        let turn_id = Uuid::new_v4();
        let span = tracing::info_span!("turn", user_id = %user_id, turn_id = %turn_id);
        async move {
            let fragments = match self.try_process_turn(user_id, message).await {
                Ok(fragments) => fragments,
                Err(failed) => {
                    tracing::error!(
                        error = %failed,
                        crisis = failed.crisis.is_some(),
                        "turn failed closed"
                    );
                    failed.fragments()
                }
            };
            tracing::info!(fragments = fragments.len(), "turn complete");
            TurnResult { turn_id, fragments }
        }
        .instrument(span)
        .await
    }

    /// 处理一轮；只有会话存储读写失败时返回错误（此时不写入任何状态）
    ///
    /// 读失败时还没有任务结果，关键词初筛命中即带上固定危机文案。
    pub async fn try_process_turn(
        &self,
        user_id: &str,
        message: &str,
    ) -> Result<Vec<Fragment>, FailedTurn> {
        let _turn_guard = self.supervisor.lock(user_id).await;
        let now = Utc::now();

        let mut state = self
            .store
            .get(user_id)
            .await
            .map_err(|e| {
                let crisis = crisis::screen(message)
                    .then(|| Fragment::new(TaskKind::Crisis.name(), crisis::CRISIS_FALLBACK));
                FailedTurn::new(e, crisis)
            })?
            .unwrap_or_else(|| SessionState::new(user_id));
        state.begin_turn(now);
        tracing::info!(message_count = state.message_count, "new message received");

        let window = self.settings.history_window;
        let snapshot = TaskContext::from_state(message, &state, window);
        let keyword_hit = crisis::screen(message);

        let (crisis_result, empathy_result, mood_result) = tokio::join!(
            self.executor.crisis(&snapshot),
            self.executor.empathy(&snapshot),
            self.executor.mood(&snapshot),
        );

        let mood = mood_result.ok();
        if let Some(score) = mood {
            state.record_mood(score);
        }

        let crisis_message = crisis::resolve(
            crisis_result.as_ref().ok().and_then(|m| m.as_deref()),
            keyword_hit,
        );

        let mut fragments = Vec::new();

        if let Some(text) = crisis_message {
            tracing::warn!(keyword_hit, "crisis detected");
            state.raise_crisis();
            fragments.push(Fragment::new(TaskKind::Crisis.name(), text));

            if self.settings.crisis_policy == CrisisPolicy::Exclusive {
                if state.report_due(self.settings.cadence, now) {
                    tracing::info!("weekly report skipped on crisis turn");
                    state.mark_reported(now);
                }
                return self.finish(state, message, fragments).await;
            }
        }

        let empathy = empathy_result.ok();
        match mood {
            Some(score) if score < self.settings.mood_threshold => {
                tracing::info!(mood = score, "low mood, empathy + coping");
                if let Some(text) = empathy {
                    fragments.push(Fragment::new(TaskKind::Empathy.name(), text));
                }
                let coping_ctx = TaskContext::from_state(message, &state, window);
                match self.refiner.refine(&coping_ctx).await {
                    Ok(outcome) => {
                        tracing::info!(
                            iterations = outcome.iterations,
                            approved = outcome.approved,
                            "coping strategy ready"
                        );
                        fragments.push(Fragment::new(COPING_SOURCE, outcome.strategy));
                    }
                    Err(e) => tracing::warn!(error = %e, "coping strategy suppressed"),
                }
            }
            _ => {
                if let Some(text) = empathy {
                    fragments.push(Fragment::new(TaskKind::Empathy.name(), text));
                }
            }
        }

        if state.report_due(self.settings.cadence, now) {
            tracing::info!(message_count = state.message_count, "weekly insights time");
            state.mark_reported(now);
            let report_ctx = TaskContext::from_state(message, &state, window);
            match self.executor.weekly_report(&report_ctx).await {
                Ok(text) => fragments.push(Fragment::new(TaskKind::WeeklyReport.name(), text)),
                Err(e) => tracing::warn!(error = %e, "weekly report suppressed"),
            }
        }

        if fragments.is_empty() {
            fragments.push(Fragment::new(FALLBACK_SOURCE, PRESENCE_FALLBACK));
        }

        self.finish(state, message, fragments).await
    }

    /// 写入最近对话并持久化
    async fn finish(
        &self,
        mut state: SessionState,
        message: &str,
        fragments: Vec<Fragment>,
    ) -> Result<Vec<Fragment>, FailedTurn> {
        let reply = fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        state.push_exchange(message, &reply, self.settings.history_window);
        if let Err(e) = self.store.put(&state).await {
            let crisis = fragments
                .into_iter()
                .find(|f| f.source == TaskKind::Crisis.name());
            return Err(FailedTurn::new(e, crisis));
        }
        Ok(fragments)
    }
}
