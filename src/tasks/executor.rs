//! 任务执行器
//!
//! 持有生成能力与模板，run(kind, ctx) 在超时内调用 llm.complete，
//! 超时或失败时转为 TaskFailure；每次调用输出结构化审计日志（JSON）。

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::time::timeout;

use crate::core::TaskFailure;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tasks::{crisis, PromptTemplates, TaskContext, TaskKind};

static MOOD_RE: OnceLock<Regex> = OnceLock::new();

/// 解析情绪分：只接受 0-10 的整数（允许 "7/10"、"7." 这类写法）
pub fn parse_mood(output: &str) -> Result<u8, TaskFailure> {
    let re = MOOD_RE.get_or_init(|| Regex::new(r"^\s*(\d{1,2})\s*(?:/\s*10)?\s*\.?\s*$").unwrap());
    re.captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .filter(|score| *score <= 10)
        .ok_or_else(|| TaskFailure::Parse(preview(output)))
}

/// 任务执行器：对每次生成施加超时，并将结果映射为 TaskFailure
pub struct TaskExecutor {
    llm: Arc<dyn LlmClient>,
    prompts: PromptTemplates,
    timeout: Duration,
}

impl TaskExecutor {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: PromptTemplates, timeout_secs: u64) -> Self {
        Self::with_timeout(llm, prompts, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(llm: Arc<dyn LlmClient>, prompts: PromptTemplates, timeout: Duration) -> Self {
        Self {
            llm,
            prompts,
            timeout,
        }
    }

    /// 生成后端的累计 token 使用：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// system(渲染后的模板) + 最近对话 + 本轮用户消息
    fn build_messages(&self, kind: TaskKind, ctx: &TaskContext) -> Vec<Message> {
        let mut messages = Vec::with_capacity(ctx.history.len() + 2);
        messages.push(Message::system(self.prompts.render(kind, ctx)));
        messages.extend(ctx.history.iter().cloned());
        messages.push(Message::user(ctx.message.clone()));
        messages
    }

    /// 执行任务，返回去除首尾空白的原始输出（可能为空）
    pub async fn run(&self, kind: TaskKind, ctx: &TaskContext) -> Result<String, TaskFailure> {
        let start = Instant::now();
        let messages = self.build_messages(kind, ctx);
        let result = match timeout(self.timeout, self.llm.complete(&messages)).await {
            Ok(Ok(text)) => Ok(text.trim().to_string()),
            Ok(Err(e)) => Err(TaskFailure::Generation(e)),
            Err(_) => Err(TaskFailure::Timeout(self.timeout)),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(f) => f.outcome(),
        };
        let audit = serde_json::json!({
            "event": "task_audit",
            "task": kind.name(),
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "task");
        if let Err(e) = &result {
            tracing::warn!(task = kind.name(), error = %e, "task failed");
        }
        result
    }

    /// 需要非空文本的任务
    pub async fn generate(&self, kind: TaskKind, ctx: &TaskContext) -> Result<String, TaskFailure> {
        let text = self.run(kind, ctx).await?;
        if text.is_empty() {
            tracing::warn!(task = kind.name(), "task returned empty output");
            return Err(TaskFailure::EmptyOutput);
        }
        Ok(text)
    }

    /// 模型的危机判定：Some(危机文案) / None(无危机)
    pub async fn crisis(&self, ctx: &TaskContext) -> Result<Option<String>, TaskFailure> {
        let text = self.run(TaskKind::Crisis, ctx).await?;
        if crisis::is_all_clear(&text) {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }

    pub async fn empathy(&self, ctx: &TaskContext) -> Result<String, TaskFailure> {
        self.generate(TaskKind::Empathy, ctx).await
    }

    pub async fn mood(&self, ctx: &TaskContext) -> Result<u8, TaskFailure> {
        let text = self.run(TaskKind::Mood, ctx).await?;
        parse_mood(&text).inspect_err(|_| {
            tracing::warn!(output = %preview(&text), "mood output is not an integer in 0-10");
        })
    }

    pub async fn weekly_report(&self, ctx: &TaskContext) -> Result<String, TaskFailure> {
        self.generate(TaskKind::WeeklyReport, ctx).await
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > 80 {
        format!("{}...", s.chars().take(80).collect::<String>())
    } else {
        s.to_string()
    }
}
