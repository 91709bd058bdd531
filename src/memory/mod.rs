//! 记忆层：最近对话（随 SessionState 持久化）

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
