//! 内存会话存储（进程内，重启即丢失）

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::SessionState;
use crate::store::{SessionStore, StoreError};

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, user_id: &str) -> Result<Option<SessionState>, StoreError> {
        Ok(self.sessions.read().await.get(user_id).cloned())
    }

    async fn put(&self, state: &SessionState) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(state.user_id.clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionState>, StoreError> {
        let mut states: Vec<_> = self.sessions.read().await.values().cloned().collect();
        states.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(states)
    }
}
