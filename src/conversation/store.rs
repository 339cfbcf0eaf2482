//! 会话存储
//!
//! save 是整份覆盖（非原子追加）：同一会话并发请求时后写者生效。

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::RwLock;

use crate::conversation::{Conversation, Turn};
use crate::core::AgentError;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<Conversation>, AgentError>;

    async fn save(&self, conversation: &Conversation) -> Result<(), AgentError>;

    /// 读取或新建；第二个返回值表示是否新建
    async fn load_or_create(&self, id: &str) -> Result<(Conversation, bool), AgentError> {
        match self.load(id).await? {
            Some(c) => Ok((c, false)),
            None => {
                tracing::info!(conversation_id = %id, "new conversation");
                Ok((Conversation::new(id), true))
            }
        }
    }
}

/// 进程内存储（测试与单次 CLI 使用）
#[derive(Default)]
pub struct InMemoryConversationStore {
    inner: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, id: &str) -> Result<Option<Conversation>, AgentError> {
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), AgentError> {
        self.inner
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }
}

/// SQLite 存储：conversations + turns 两张表
pub struct SqliteConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AgentError::Store(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, AgentError> {
        Self::init(Connection::open_in_memory().map_err(store_err)?)
    }

    fn init(conn: Connection) -> Result<Self, AgentError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS turns (
                conversation_id TEXT NOT NULL,
                turn INTEGER NOT NULL,
                user_query TEXT NOT NULL,
                response TEXT NOT NULL,
                generated_sql TEXT,
                raw_result TEXT,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (conversation_id, turn),
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            );",
        )
        .map_err(store_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, AgentError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| AgentError::Store("store connection lock poisoned".to_string()))?;
            f(&mut conn).map_err(store_err)
        })
        .await
        .map_err(|e| AgentError::Store(e.to_string()))?
    }
}

fn store_err(e: rusqlite::Error) -> AgentError {
    AgentError::Store(e.to_string())
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn load(&self, id: &str) -> Result<Option<Conversation>, AgentError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let head = conn
                .query_row(
                    "SELECT user_id, created_at FROM conversations WHERE id = ?1",
                    [&id],
                    |r| Ok((r.get::<_, String>(0)?, r.get::<_, DateTime<Utc>>(1)?)),
                )
                .optional()?;
            let Some((user_id, created_at)) = head else {
                return Ok(None);
            };
            let mut stmt = conn.prepare(
                "SELECT turn, user_query, response, generated_sql, raw_result, timestamp
                 FROM turns WHERE conversation_id = ?1 ORDER BY turn",
            )?;
            let turns = stmt
                .query_map([&id], |r| {
                    Ok(Turn {
                        turn: r.get(0)?,
                        user_query: r.get(1)?,
                        response: r.get(2)?,
                        generated_sql: r.get(3)?,
                        raw_result: r.get(4)?,
                        timestamp: r.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Some(Conversation::restore(id.as_str(), user_id, created_at, turns)))
        })
        .await
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), AgentError> {
        let conversation = conversation.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO conversations (id, user_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET user_id = excluded.user_id, updated_at = excluded.updated_at",
                params![conversation.id, conversation.user_id, conversation.created_at, Utc::now()],
            )?;
            tx.execute("DELETE FROM turns WHERE conversation_id = ?1", [&conversation.id])?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO turns (conversation_id, turn, user_query, response, generated_sql, raw_result, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for t in conversation.turns() {
                    insert.execute(params![
                        conversation.id,
                        t.turn,
                        t.user_query,
                        t.response,
                        t.generated_sql,
                        t.raw_result,
                        t.timestamp
                    ])?;
                }
            }
            tx.commit()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::NewTurn;

    async fn roundtrip(store: &dyn ConversationStore) {
        let (mut c, created) = store.load_or_create("abc").await.unwrap();
        assert!(created);
        c.append_turn(NewTurn::new("q", "\"Valid\""));
        c.append_turn(
            NewTurn::new("q", "[{\"n\":1}]")
                .with_sql(Some("SELECT 1 AS n".into()))
                .with_raw_result(Some("[{\"n\":1}]".into())),
        );
        store.save(&c).await.unwrap();

        let (loaded, created) = store.load_or_create("abc").await.unwrap();
        assert!(!created);
        assert_eq!(loaded.user_id, "anonymous");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.turns()[1].turn, 2);
        assert_eq!(loaded.turns()[1].generated_sql.as_deref(), Some("SELECT 1 AS n"));
        assert_eq!(loaded.previous_context(), c.previous_context());
        assert_eq!(
            loaded.created_at.timestamp_millis(),
            c.created_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        roundtrip(&InMemoryConversationStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conv.db");
        roundtrip(&SqliteConversationStore::open(&path).unwrap()).await;

        let reopened = SqliteConversationStore::open(&path).unwrap();
        let c = reopened.load("abc").await.unwrap().unwrap();
        assert_eq!(c.len(), 2);
        assert!(reopened.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_turn_list() {
        let store = SqliteConversationStore::open_in_memory().unwrap();
        let mut c = Conversation::new("x");
        c.append_turn(NewTurn::new("a", "1"));
        c.append_turn(NewTurn::new("b", "2"));
        store.save(&c).await.unwrap();

        // 陈旧副本覆盖：后写者生效
        let stale = Conversation::restore("x", "anonymous", c.created_at, c.turns()[..1].to_vec());
        store.save(&stale).await.unwrap();
        assert_eq!(store.load("x").await.unwrap().unwrap().len(), 1);
    }
}
