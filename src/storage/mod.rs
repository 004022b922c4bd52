//! 对话记录持久化

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod sqlite;

pub use sqlite::SqliteChatStore;

/// 存储层错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chat {0} not found")]
    NotFound(i64),

    #[error("lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "agent" | "assistant" => Ok(Role::Agent),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// 对话摘要行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: i64,
    pub query: String,
    pub agent_name: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// 对话中的单条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// 导出格式：摘要 + 按时间排序的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatExport {
    pub chat: ChatRecord,
    pub messages: Vec<Message>,
}

/// 对话存储接口。实现方需自行串行化写入。
pub trait ChatStore: Send + Sync {
    /// 写入一条对话摘要，返回对话ID
    fn add_chat(&self, query: &str, agent_name: &str, response: &str) -> Result<i64>;

    /// 更新对话摘要中的智能体与回复
    fn update_chat_response(&self, chat_id: i64, agent_name: &str, response: &str) -> Result<()>;

    /// 追加一条消息
    fn add_message(&self, chat_id: i64, role: Role, content: &str) -> Result<i64>;

    /// 所有对话，按创建时间倒序
    fn get_all_chats(&self) -> Result<Vec<ChatRecord>>;

    fn get_chat(&self, chat_id: i64) -> Result<Option<ChatRecord>>;

    /// 对话中的消息，按创建时间正序
    fn get_chat_messages(&self, chat_id: i64) -> Result<Vec<Message>>;

    /// 删除对话及其消息，返回是否存在
    fn delete_chat(&self, chat_id: i64) -> Result<bool>;

    /// 按查询文本或智能体名称搜索（大小写不敏感）
    fn search_chats(&self, text: &str) -> Result<Vec<ChatRecord>> {
        let needle = text.trim().to_lowercase();
        let chats = self.get_all_chats()?;
        if needle.is_empty() {
            return Ok(chats);
        }
        Ok(chats
            .into_iter()
            .filter(|c| {
                c.query.to_lowercase().contains(&needle)
                    || c.agent_name.to_lowercase().contains(&needle)
            })
            .collect())
    }

    /// 导出对话为JSON
    fn export_chat(&self, chat_id: i64) -> Result<String> {
        let chat = self
            .get_chat(chat_id)?
            .ok_or(StoreError::NotFound(chat_id))?;
        let messages = self.get_chat_messages(chat_id)?;
        Ok(serde_json::to_string_pretty(&ChatExport { chat, messages })?)
    }
}
