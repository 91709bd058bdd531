//! 会话存储抽象层
//!
//! 以 user_id 为键的 SessionState 键值存储，支持内存和 SQLite 两种实现。
//! 读到的记录缺字段时按默认值补齐（见 SessionState 的 serde 默认值）。

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{StoreBackend, StoreSection};
use crate::core::SessionState;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("State encoding error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 读取用户状态；从未见过的用户返回 None
    async fn get(&self, user_id: &str) -> Result<Option<SessionState>, StoreError>;

    /// 写入（覆盖）用户状态
    async fn put(&self, state: &SessionState) -> Result<(), StoreError>;

    /// 列出全部已存储的状态（诊断用）
    async fn list(&self) -> Result<Vec<SessionState>, StoreError>;
}

/// 按配置创建会话存储
pub fn create_session_store(cfg: &StoreSection) -> Result<Arc<dyn SessionStore>, StoreError> {
    match cfg.backend {
        StoreBackend::Sqlite => {
            let store = SqliteSessionStore::open(&cfg.path)?;
            tracing::info!("Using SQLite session store: {:?}", cfg.path);
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::info!("Using in-memory session store");
            Ok(Arc::new(MemorySessionStore::new()))
        }
    }
}
