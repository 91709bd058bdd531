//! 任务：封闭的任务种类集合，每个任务 = 提示词模板 + 上下文快照 → 生成结果
//!
//! 任务本身无状态；TaskExecutor 负责渲染提示词、调用生成能力、施加超时并返回带类型的结果。

pub mod crisis;
pub mod executor;
pub mod prompts;

pub use executor::{parse_mood, TaskExecutor};
pub use prompts::PromptTemplates;

use crate::core::SessionState;
use crate::memory::Message;

/// 任务种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Crisis,
    Empathy,
    Mood,
    CopingGenerate,
    CopingRefine,
    CopingCheck,
    WeeklyReport,
}

impl TaskKind {
    pub const ALL: [TaskKind; 7] = [
        TaskKind::Crisis,
        TaskKind::Empathy,
        TaskKind::Mood,
        TaskKind::CopingGenerate,
        TaskKind::CopingRefine,
        TaskKind::CopingCheck,
        TaskKind::WeeklyReport,
    ];

    /// 任务名：用于日志、片段来源与提示词覆盖文件名
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Crisis => "crisis_detector",
            TaskKind::Empathy => "empathy_agent",
            TaskKind::Mood => "mood_analyzer",
            TaskKind::CopingGenerate => "strategy_generator",
            TaskKind::CopingRefine => "strategy_refiner",
            TaskKind::CopingCheck => "quality_checker",
            TaskKind::WeeklyReport => "weekly_reporter",
        }
    }
}

/// 任务输入快照：同一轮并发的任务拿到的是同一份只读快照
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    pub message: String,
    pub history: Vec<Message>,
    pub user_name: Option<String>,
    /// 最近一次记录的情绪分
    pub mood: Option<u8>,
    pub mood_history: Vec<u8>,
    pub message_count: u64,
    pub favorite_coping: Option<String>,
    /// 检索到的参考片段（仅应对策略任务使用）
    pub grounding: Vec<String>,
    pub candidate: Option<String>,
    pub feedback: Option<String>,
}

impl TaskContext {
    pub fn from_state(message: &str, state: &SessionState, history_window: usize) -> Self {
        Self {
            message: message.to_string(),
            history: state.history.recent(history_window).to_vec(),
            user_name: state.user_name.clone(),
            mood: state.latest_mood(),
            mood_history: state.mood_history.to_vec(),
            message_count: state.message_count,
            favorite_coping: state.favorite_coping.clone(),
            ..Self::default()
        }
    }

    pub fn with_grounding(mut self, grounding: Vec<String>) -> Self {
        self.grounding = grounding;
        self
    }

    pub fn with_candidate(mut self, candidate: impl Into<String>) -> Self {
        self.candidate = Some(candidate.into());
        self
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}
