//! 短期记忆：最近对话
//!
//! 保留最近 N 条消息（用户消息 + 当轮合并后的回复），随 SessionState 一起持久化，
//! 作为各任务的对话上下文。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 最近对话：只存消息本身，窗口大小由调用方（配置 history_window）决定
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条消息，超出 window 时丢弃最旧的
    pub fn push(&mut self, msg: Message, window: usize) {
        self.messages.push(msg);
        self.prune(window);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 最近 n 条（n 大于总数时返回全部）
    pub fn recent(&self, n: usize) -> &[Message] {
        &self.messages[self.messages.len().saturating_sub(n)..]
    }

    fn prune(&mut self, window: usize) {
        if self.messages.len() > window {
            let drop = self.messages.len() - window;
            self.messages.drain(..drop);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_prunes_oldest() {
        let mut mem = ConversationMemory::new();
        for i in 0..5 {
            mem.push(Message::user(format!("m{i}")), 3);
        }
        let contents: Vec<_> = mem.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_recent_window() {
        let mut mem = ConversationMemory::new();
        mem.push(Message::user("a"), 10);
        mem.push(Message::assistant("b"), 10);
        assert_eq!(mem.recent(1)[0].content, "b");
        assert_eq!(mem.recent(5).len(), 2);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let mut mem = ConversationMemory::new();
        mem.push(Message::user("hi"), 10);
        let json = serde_json::to_string(&mem).unwrap();
        assert_eq!(json, r#"[{"role":"user","content":"hi"}]"#);
    }
}
