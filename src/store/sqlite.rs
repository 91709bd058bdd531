//! SQLite 会话存储
//!
//! 表 `sessions(user_id TEXT PRIMARY KEY, state TEXT, updated_at TEXT)`，state 为 SessionState 的 JSON。
//! rusqlite 是同步接口，读写放到 spawn_blocking 中执行，连接由 Mutex 串行化。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::SessionState;
use crate::store::{SessionStore, StoreError};

#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    /// 打开（不存在则创建）数据库文件；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                user_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 在阻塞线程池里持锁执行 f
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await?
    }
}

/// 解析一行记录；旧记录里没有 user_id 字段时用主键补上
fn decode(user_id: String, json: &str) -> Result<SessionState, StoreError> {
    let mut state: SessionState = serde_json::from_str(json)?;
    if state.user_id.is_empty() {
        state.user_id = user_id;
    }
    Ok(state)
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, user_id: &str) -> Result<Option<SessionState>, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT state FROM sessions WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            json.map(|j| decode(user_id, &j)).transpose()
        })
        .await
    }

    async fn put(&self, state: &SessionState) -> Result<(), StoreError> {
        let user_id = state.user_id.clone();
        let json = serde_json::to_string(state)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (user_id, state, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
                params![user_id, json, chrono::Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<SessionState>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT user_id, state FROM sessions ORDER BY user_id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut states = Vec::new();
            for row in rows {
                let (user_id, json) = row?;
                states.push(decode(user_id, &json)?);
            }
            Ok(states)
        })
        .await
    }
}
