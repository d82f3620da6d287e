//! 会话记录与对话条目
//!
//! Session 以令牌为键持久化；chat 只追加，条目写入后不再修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会话令牌（不透明随机串，作为存储主键与 Cookie 值）
pub type SessionToken = String;

/// 一轮用户 / 助手交互
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// 用户原始消息
    pub message: String,
    /// 规范化后的助手回答
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<String>>,
    /// 预留字段：当前流程不填充
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_questions: Option<Vec<String>>,
}

impl ChatEntry {
    pub fn new(message: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: response.into(),
            support_images: None,
            references: None,
            followup_questions: None,
        }
    }
}

/// 匿名会话：至多绑定一个后端对话线程
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: SessionToken,
    /// 首条消息时由后端分配，设置后不可变
    #[serde(rename = "threadID")]
    pub thread_id: Option<String>,
    pub chat: Vec<ChatEntry>,
    /// 仅用于诊断
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// 以新令牌创建空会话（无线程、无历史）
    pub fn new(token: impl Into<SessionToken>, user_agent: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            token: token.into(),
            thread_id: None,
            chat: Vec::new(),
            user_agent,
            created_at: now,
            updated_at: now,
        }
    }

    /// 日志里只打印令牌前缀
    pub fn token_prefix(&self) -> &str {
        let end = self
            .token
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.token.len());
        &self.token[..end]
    }
}

/// 生成新的会话令牌（UUID v4，由系统 CSPRNG 提供随机性）
pub fn mint_token() -> SessionToken {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_empty() {
        let s = Session::new("tok", Some("curl/8".into()));
        assert!(s.thread_id.is_none());
        assert!(s.chat.is_empty());
        assert_eq!(s.created_at, s.updated_at);
    }

    #[test]
    fn test_minted_tokens_are_unique() {
        let a = mint_token();
        let b = mint_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_session_serializes_like_document() {
        let mut s = Session::new("abc", None);
        s.thread_id = Some("thread_1".into());
        s.chat.push(ChatEntry::new("Hello", "Hi there!"));
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["threadID"], "thread_1");
        assert_eq!(v["chat"][0]["response"], "Hi there!");
        assert!(v["chat"][0].get("followup_questions").is_none());
        assert!(v.get("userAgent").is_some());
    }

    #[test]
    fn test_token_prefix_is_short() {
        let s = Session::new("0123456789abcdef", None);
        assert_eq!(s.token_prefix(), "01234567");
        let short = Session::new("abc", None);
        assert_eq!(short.token_prefix(), "abc");
    }
}
