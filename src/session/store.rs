//! 会话存储抽象层
//!
//! 定义统一的会话存取接口，支持内存和 SQLite 两种实现；编排器只依赖该 trait。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::model::{ChatEntry, Session};
use crate::error::ChatError;

#[cfg(feature = "async-sqlite")]
use super::sqlite::SqliteSessionStore;

/// 会话存储接口（按令牌寻址的文档存储）
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 持久化新会话
    async fn insert(&self, session: &Session) -> Result<(), ChatError>;

    /// 按令牌查找会话
    async fn find(&self, token: &str) -> Result<Option<Session>, ChatError>;

    /// 仅当会话尚无线程时写入 thread_id；返回最终生效的 thread_id（已有值优先）
    async fn attach_thread(&self, token: &str, thread_id: &str) -> Result<String, ChatError>;

    /// 原子地向会话历史追加一条记录
    async fn append_chat_entry(&self, token: &str, entry: &ChatEntry) -> Result<(), ChatError>;

    /// 已存储的会话数
    async fn session_count(&self) -> Result<usize, ChatError>;
}

/// 内存会话存储（进程重启即丢失，适合开发与测试）
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<(), ChatError> {
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn find(&self, token: &str) -> Result<Option<Session>, ChatError> {
        Ok(self.sessions.read().await.get(token).cloned())
    }

    async fn attach_thread(&self, token: &str, thread_id: &str) -> Result<String, ChatError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(token).ok_or(ChatError::SessionNotFound)?;
        if let Some(existing) = &session.thread_id {
            return Ok(existing.clone());
        }
        session.thread_id = Some(thread_id.to_string());
        session.updated_at = Utc::now();
        Ok(thread_id.to_string())
    }

    async fn append_chat_entry(&self, token: &str, entry: &ChatEntry) -> Result<(), ChatError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(token).ok_or(ChatError::SessionNotFound)?;
        session.chat.push(entry.clone());
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn session_count(&self) -> Result<usize, ChatError> {
        Ok(self.sessions.read().await.len())
    }
}

/// 创建会话存储
///
/// 如果提供了 db_path 且启用了 async-sqlite feature，则使用 SQLite 存储；否则使用内存存储
pub async fn create_session_store(
    db_path: Option<&std::path::Path>,
) -> Result<Arc<dyn SessionStore>, ChatError> {
    #[cfg(feature = "async-sqlite")]
    if let Some(path) = db_path {
        let store = SqliteSessionStore::open(path).await?;
        tracing::info!("Using SQLite session store: {:?}", path);
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "async-sqlite"))]
    if db_path.is_some() {
        tracing::warn!(
            "Persistent session store requested but async-sqlite feature not enabled, using memory store"
        );
    }

    tracing::info!("Using in-memory session store");
    Ok(Arc::new(MemorySessionStore::new()))
}
