//! 请求级错误类型
//!
//! 所有错误都只作用于单个请求：编排器边界统一捕获，由 HTTP 层映射为 404 / 500。

use thiserror::Error;

/// 会话绑定、任务轮询、应答规范化过程中可能出现的错误
#[derive(Error, Debug)]
pub enum ChatError {
    /// 请求携带了令牌，但存储中没有对应会话
    #[error("Session not found")]
    SessionNotFound,

    #[error("Job timed out after {attempts} polls")]
    JobTimeout { attempts: u32 },

    #[error("Job finished with status: {status}")]
    JobFailed { status: String },

    /// 结构化抽取结果无法解析或缺少必填的 response 字段
    #[error("Malformed structured response: {0}")]
    MalformedStructuredResponse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// 后端网络 / API 调用失败
    #[error("Upstream transport error: {0}")]
    Upstream(String),
}

impl ChatError {
    /// 是否应作为 404 暴露给客户端（其余一律 500）
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChatError::SessionNotFound)
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Upstream(e.to_string())
    }
}

impl From<async_openai::error::OpenAIError> for ChatError {
    fn from(e: async_openai::error::OpenAIError) -> Self {
        ChatError::Upstream(e.to_string())
    }
}

#[cfg(feature = "async-sqlite")]
impl From<sqlx::Error> for ChatError {
    fn from(e: sqlx::Error) -> Self {
        ChatError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_session_not_found_is_not_found() {
        assert!(ChatError::SessionNotFound.is_not_found());
        assert!(!ChatError::JobTimeout { attempts: 30 }.is_not_found());
        assert!(!ChatError::Storage("disk".into()).is_not_found());
    }

    #[test]
    fn test_job_failed_message_carries_status() {
        let err = ChatError::JobFailed {
            status: "failed".into(),
        };
        assert_eq!(err.to_string(), "Job finished with status: failed");
    }
}
