//! 会话监管：按 user_id 串行化轮次
//!
//! 同一用户的两条消息（如快速连发）不会并发执行 load → mutate → persist，
//! 保证 message_count 与情绪历史不因竞争丢失更新；不同用户之间互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// 每用户一把锁；空闲（无人持有）的锁在下次加锁时清理
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取该用户的轮次锁，guard 释放前同一用户的其它轮次等待
    pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|id, l| id == user_id || Arc::strong_count(l) > 1);
            let lock = Arc::clone(locks.entry(user_id.to_string()).or_default());
            tracing::debug!(user_id = %user_id, tracked = locks.len(), "session lock requested");
            lock
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let supervisor = Arc::new(SessionSupervisor::new());
        let guard = supervisor.lock("alice").await;

        let s = Arc::clone(&supervisor);
        let waiter = tokio::spawn(async move {
            let _g = s.lock("alice").await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_other_users_not_blocked() {
        let supervisor = SessionSupervisor::new();
        let _a = supervisor.lock("alice").await;
        let b = tokio::time::timeout(Duration::from_millis(200), supervisor.lock("bob")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let supervisor = SessionSupervisor::new();
        drop(supervisor.lock("alice").await);
        drop(supervisor.lock("bob").await);
        let _c = supervisor.lock("carol").await;
        assert_eq!(supervisor.tracked().await, 1);
    }
}
