//! SQLite 会话存储
//!
//! 会话元数据一张表、对话条目一张表（按自增 id 保序），服务重启后会话仍可通过 Cookie 找回。

#![cfg(feature = "async-sqlite")]

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::model::{ChatEntry, Session};
use super::store::SessionStore;
use crate::error::ChatError;

/// 基于 sqlx 连接池的会话存储
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// 打开（必要时创建）数据库并建表
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                thread_id TEXT,
                user_agent TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chat_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT NOT NULL,
                message TEXT NOT NULL,
                response TEXT NOT NULL,
                support_images TEXT,
                refs TEXT,
                followup_questions TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (token) REFERENCES sessions(token) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_entries_token ON chat_entries(token)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn load_entries(&self, token: &str) -> Result<Vec<ChatEntry>, ChatError> {
        let rows = sqlx::query(
            "SELECT message, response, support_images, refs, followup_questions
             FROM chat_entries WHERE token = ? ORDER BY id ASC",
        )
        .bind(token)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<ChatEntry, ChatError> {
    Ok(ChatEntry {
        message: row.try_get("message")?,
        response: row.try_get("response")?,
        support_images: decode_list(row.try_get("support_images")?)?,
        references: decode_list(row.try_get("refs")?)?,
        followup_questions: decode_list(row.try_get("followup_questions")?)?,
    })
}

fn encode_list(list: &Option<Vec<String>>) -> Result<Option<String>, ChatError> {
    list.as_ref()
        .map(|items| serde_json::to_string(items))
        .transpose()
        .map_err(|e| ChatError::Storage(e.to_string()))
}

fn decode_list(raw: Option<String>) -> Result<Option<Vec<String>>, ChatError> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| ChatError::Storage(e.to_string()))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, ChatError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ChatError::Storage(format!("bad timestamp {raw:?}: {e}")))
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, session: &Session) -> Result<(), ChatError> {
        sqlx::query(
            "INSERT INTO sessions (token, thread_id, user_agent, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(&session.thread_id)
        .bind(&session.user_agent)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, token: &str) -> Result<Option<Session>, ChatError> {
        let row = sqlx::query(
            "SELECT token, thread_id, user_agent, created_at, updated_at
             FROM sessions WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(Some(Session {
            token: row.try_get("token")?,
            thread_id: row.try_get("thread_id")?,
            user_agent: row.try_get("user_agent")?,
            chat: self.load_entries(token).await?,
            created_at: parse_time(&created_at)?,
            updated_at: parse_time(&updated_at)?,
        }))
    }

    async fn attach_thread(&self, token: &str, thread_id: &str) -> Result<String, ChatError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE sessions SET thread_id = ?, updated_at = ?
             WHERE token = ? AND thread_id IS NULL",
        )
        .bind(thread_id)
        .bind(&now)
        .bind(token)
        .execute(&self.pool)
        .await?;

        let current: Option<Option<String>> =
            sqlx::query_scalar("SELECT thread_id FROM sessions WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Err(ChatError::SessionNotFound),
            Some(Some(id)) => Ok(id),
            Some(None) => Err(ChatError::Storage(format!(
                "thread id not recorded for session {token}"
            ))),
        }
    }

    async fn append_chat_entry(&self, token: &str, entry: &ChatEntry) -> Result<(), ChatError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE sessions SET updated_at = ? WHERE token = ?")
            .bind(&now)
            .bind(token)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(ChatError::SessionNotFound);
        }

        sqlx::query(
            "INSERT INTO chat_entries
             (token, message, response, support_images, refs, followup_questions, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(token)
        .bind(&entry.message)
        .bind(&entry.response)
        .bind(encode_list(&entry.support_images)?)
        .bind(encode_list(&entry.references)?)
        .bind(encode_list(&entry.followup_questions)?)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn session_count(&self) -> Result<usize, ChatError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
