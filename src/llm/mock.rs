//! 离线 / 测试用 LLM 客户端（无需 API）
//!
//! - MockLlmClient：按系统提示词判断是哪个任务，给出确定性的离线回复，便于本地跑通整轮流程。
//! - ScriptedLlmClient：由闭包 (system, user) 决定回复，记录每次调用，可对指定任务注入延迟。

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};
use crate::tasks::crisis;

const NEGATIVE_WORDS: &[&str] = &[
    "sad", "tired", "exhausted", "failed", "stupid", "alone", "lonely", "awful", "anxious",
    "panic", "overwhelmed", "hurt", "cry", "empty", "worthless", "stressed",
];
const POSITIVE_WORDS: &[&str] = &[
    "happy", "great", "good", "excited", "grateful", "calm", "better", "proud", "relieved",
];

fn system_and_user(messages: &[Message]) -> (&str, &str) {
    let system = messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .unwrap_or("");
    let user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)");
    (system, user)
}

/// 关键词粗估情绪分
fn heuristic_mood(text: &str) -> u8 {
    let lower = text.to_lowercase();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    match (negative, positive) {
        (0, 0) => 6,
        (n, p) if n > p => 3,
        (n, p) if p > n => 8,
        _ => 5,
    }
}

/// Mock 客户端：离线确定性回复
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let (system, user) = system_and_user(messages);

        let reply = if system.contains("safety monitor") {
            if crisis::screen(user) {
                crisis::CRISIS_FALLBACK.to_string()
            } else {
                "NONE".to_string()
            }
        } else if system.contains("Output ONLY the number") {
            heuristic_mood(user).to_string()
        } else if system.contains("strict validator") {
            "APPROVED".to_string()
        } else if system.contains("Coping Strategy Researcher")
            || system.contains("final optimizer")
        {
            "If it feels okay, try the 5-4-3-2-1 grounding exercise: notice five things you can see, \
             four you can touch, three you can hear, two you can smell and one you can taste. \
             Go slowly, there is no right way to do it. I'm here with you."
                .to_string()
        } else if system.contains("growth guide") {
            "Looking back at this week, you kept showing up and sharing what felt hard. \
             That is real strength, and I'm glad you're here."
                .to_string()
        } else {
            format!(
                "It sounds like a lot is sitting with you right now: \"{}\". \
                 That makes sense. I'm right here with you. You're not alone.",
                user
            )
        };
        Ok(reply)
    }
}

/// 一次被记录的调用
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub system: String,
    pub user: String,
}

type Handler = dyn Fn(&str, &str) -> Result<String, LlmError> + Send + Sync;

/// 脚本化客户端：handler(system, user) 决定回复
pub struct ScriptedLlmClient {
    handler: Box<Handler>,
    delays: Vec<(String, Duration)>,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedLlmClient {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delays: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 系统提示词包含 marker 的调用先等待 delay（用于模拟超时）
    pub fn with_delay(mut self, marker: impl Into<String>, delay: Duration) -> Self {
        self.delays.push((marker.into(), delay));
        self
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// 系统提示词包含 marker 的调用次数
    pub fn count_calls(&self, marker: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.system.contains(marker))
            .count()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let (system, user) = system_and_user(messages);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ScriptedCall {
                system: system.to_string(),
                user: user.to_string(),
            });
        }
        if let Some((_, delay)) = self.delays.iter().find(|(m, _)| system.contains(m.as_str())) {
            tokio::time::sleep(*delay).await;
        }
        (self.handler)(system, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::prompts::{CRISIS_TEMPLATE, MOOD_TEMPLATE};

    #[tokio::test]
    async fn test_mock_crisis_and_mood() {
        let mock = MockLlmClient;
        let crisis = mock
            .complete(&[Message::system(CRISIS_TEMPLATE), Message::user("I want to end it all")])
            .await
            .unwrap();
        assert!(crisis.contains("988"));

        let mood = mock
            .complete(&[Message::system(MOOD_TEMPLATE), Message::user("I failed my exam and feel stupid")])
            .await
            .unwrap();
        assert_eq!(mood, "3");
    }

    #[tokio::test]
    async fn test_scripted_records_calls() {
        let client = ScriptedLlmClient::new(|system, _| Ok(system.to_uppercase()));
        let out = client
            .complete(&[Message::system("abc"), Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(out, "ABC");
        assert_eq!(client.count_calls("abc"), 1);
        assert_eq!(client.calls()[0].user, "hi");
    }
}
