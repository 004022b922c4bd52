//! SQLite对话存储

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::{ChatRecord, ChatStore, Message, Result, Role, StoreError};

/// 当前数据库结构版本
const SCHEMA_VERSION: i32 = 1;

/// 基于SQLite的对话存储，单连接 + 互斥锁串行化所有写入
#[derive(Clone)]
pub struct SqliteChatStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteChatStore {
    /// 在指定路径打开或创建数据库
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Opened chat database");
        Self::with_connection(conn)
    }

    /// 内存数据库，用于测试
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;

        if current_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS chats (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_query TEXT NOT NULL,
                    agent_name TEXT NOT NULL,
                    agent_response TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    chat_id INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id);
                "#,
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
            debug!(version = SCHEMA_VERSION, "Applied chat schema migration");
        }

        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRecord> {
    Ok(ChatRecord {
        id: row.get(0)?,
        query: row.get(1)?,
        agent_name: row.get(2)?,
        response: row.get(3)?,
        created_at: parse_timestamp(4, row.get(4)?)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let raw_role: String = row.get(2)?;
    let role = raw_role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;
    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        role,
        content: row.get(3)?,
        created_at: parse_timestamp(4, row.get(4)?)?,
    })
}

impl ChatStore for SqliteChatStore {
    fn add_chat(&self, query: &str, agent_name: &str, response: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO chats (user_query, agent_name, agent_response, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![query, agent_name, response, now()],
        )?;
        let id = conn.last_insert_rowid();
        debug!(chat_id = id, agent = agent_name, "Stored chat");
        Ok(id)
    }

    fn update_chat_response(&self, chat_id: i64, agent_name: &str, response: &str) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE chats SET agent_name = ?1, agent_response = ?2 WHERE id = ?3",
            params![agent_name, response, chat_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(chat_id));
        }
        Ok(())
    }

    fn add_message(&self, chat_id: i64, role: Role, content: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (chat_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![chat_id, role.as_str(), content, now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_all_chats(&self) -> Result<Vec<ChatRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_query, agent_name, agent_response, created_at
             FROM chats ORDER BY created_at DESC, id DESC",
        )?;
        let chats = stmt
            .query_map([], chat_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(chats)
    }

    fn get_chat(&self, chat_id: i64) -> Result<Option<ChatRecord>> {
        let conn = self.lock()?;
        let chat = conn
            .query_row(
                "SELECT id, user_query, agent_name, agent_response, created_at
                 FROM chats WHERE id = ?1",
                params![chat_id],
                chat_from_row,
            )
            .optional()?;
        Ok(chat)
    }

    fn get_chat_messages(&self, chat_id: i64) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, role, content, created_at
             FROM messages WHERE chat_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let messages = stmt
            .query_map(params![chat_id], message_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    fn delete_chat(&self, chat_id: i64) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])?;
        let deleted = tx.execute("DELETE FROM chats WHERE id = ?1", params![chat_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }
}
