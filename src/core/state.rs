//! 会话状态：SessionState（每用户一份，随轮次加载 / 修改 / 持久化）与单轮输出 TurnResult
//!
//! 持久化字段名沿用旧库中的键（past_moods、user_name、message_count、crisis_flag、favorite_coping），
//! 缺失字段取默认值，因此旧记录与部分字段记录都能直接加载。

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::{ConversationMemory, Message};

/// 情绪历史最多保留的条数
pub const MOOD_HISTORY_CAP: usize = 100;

/// 情绪历史：固定容量的环形缓冲，超出时淘汰最旧的分数
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredScores", into = "Vec<u8>")]
pub struct MoodHistory(VecDeque<u8>);

impl MoodHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, score: u8) {
        self.0.push_back(score);
        while self.0.len() > MOOD_HISTORY_CAP {
            self.0.pop_front();
        }
    }

    pub fn latest(&self) -> Option<u8> {
        self.0.back().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.iter().copied().collect()
    }
}

impl From<Vec<u8>> for MoodHistory {
    /// 加载时同样只保留最近 MOOD_HISTORY_CAP 条
    fn from(scores: Vec<u8>) -> Self {
        let skip = scores.len().saturating_sub(MOOD_HISTORY_CAP);
        Self(scores.into_iter().skip(skip).collect())
    }
}

/// 旧记录里的情绪分可能是整数、小数或数字字符串（模型原样输出），也可能为 null
#[derive(Deserialize)]
#[serde(transparent)]
struct StoredScores(Option<Vec<serde_json::Value>>);

/// 取整并限制在 0-10；无法解析的返回 None
fn lenient_score(value: &serde_json::Value) -> Option<u8> {
    let score = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    score
        .is_finite()
        .then(|| score.round().clamp(0.0, 10.0) as u8)
}

impl From<StoredScores> for MoodHistory {
    fn from(stored: StoredScores) -> Self {
        let values = stored.0.unwrap_or_default();
        let scores: Vec<u8> = values.iter().filter_map(lenient_score).collect();
        if scores.len() < values.len() {
            tracing::warn!(
                dropped = values.len() - scores.len(),
                "unparseable mood entries dropped on load"
            );
        }
        scores.into()
    }
}

impl From<MoodHistory> for Vec<u8> {
    fn from(history: MoodHistory) -> Self {
        history.0.into_iter().collect()
    }
}

/// 周报节奏：按消息数或按天数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportCadence {
    /// 距上次周报至少 N 条消息
    EveryMessages(u64),
    /// 距上次周报（或会话首轮）至少 N 天
    EveryDays(i64),
}

/// 每用户会话状态
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub user_id: String,
    #[serde(alias = "past_moods")]
    pub mood_history: MoodHistory,
    /// 已处理的轮数，每轮在派发任务前 +1
    pub message_count: u64,
    /// 一旦置位，编排器不会清除
    pub crisis_flag: bool,
    /// 由外部设置，编排器只读
    pub user_name: Option<String>,
    /// 以往有效的应对方式，由外部设置，编排器只读
    pub favorite_coping: Option<String>,
    /// 上次出周报（或因危机跳过周报）时的 message_count；旧记录没有此字段
    pub last_report_at_count: Option<u64>,
    pub last_report_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub history: ConversationMemory,
}

impl SessionState {
    /// 首次接触时的默认状态
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// 开始新一轮：计数 +1，首轮记录创建时间
    pub fn begin_turn(&mut self, now: DateTime<Utc>) {
        self.message_count += 1;
        self.created_at.get_or_insert(now);
    }

    pub fn record_mood(&mut self, score: u8) {
        self.mood_history.push(score);
    }

    pub fn latest_mood(&self) -> Option<u8> {
        self.mood_history.latest()
    }

    pub fn raise_crisis(&mut self) {
        self.crisis_flag = true;
    }

    /// 本轮是否到了出周报的时间
    pub fn report_due(&self, cadence: ReportCadence, now: DateTime<Utc>) -> bool {
        if self.message_count == 0 {
            return false;
        }
        match cadence {
            ReportCadence::EveryMessages(n) => match self.last_report_at_count {
                Some(at) => self.message_count.saturating_sub(at) >= n,
                // 从未记录过：按整倍数对齐，旧记录续上原来的节奏
                None => self.message_count % n.max(1) == 0,
            },
            ReportCadence::EveryDays(days) => self
                .last_report_at
                .or(self.created_at)
                .map(|since| now - since >= Duration::days(days))
                .unwrap_or(false),
        }
    }

    /// 记录本轮已出（或已跳过）周报
    pub fn mark_reported(&mut self, now: DateTime<Utc>) {
        self.last_report_at_count = Some(self.message_count);
        self.last_report_at = Some(now);
    }

    /// 把本轮的用户消息与合并后的回复写入最近对话
    pub fn push_exchange(&mut self, user_message: &str, reply: &str, window: usize) {
        self.history.push(Message::user(user_message), window);
        if !reply.is_empty() {
            self.history.push(Message::assistant(reply), window);
        }
    }
}

/// 输出片段：来源任务名仅用于观测，用户只看到 text
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub source: &'static str,
    pub text: String,
}

impl Fragment {
    pub fn new(source: &'static str, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
        }
    }
}

/// 单轮的有序输出
#[derive(Clone, Debug, Serialize)]
pub struct TurnResult {
    pub turn_id: Uuid,
    pub fragments: Vec<Fragment>,
}

impl TurnResult {
    pub fn sources(&self) -> Vec<&'static str> {
        self.fragments.iter().map(|f| f.source).collect()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }

    /// 面向用户的合并文本（片段间空一行）
    pub fn render(&self) -> String {
        self.texts().join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}
