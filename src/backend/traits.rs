//! 后端能力抽象
//!
//! 编排器只通过这三个 trait 与后端交互：
//! - AssistantBackend：对话线程 + 异步任务（thread / run / poll）
//! - StructuredGenerator：约束输出为固定 JSON Schema 的同步生成
//! - SpeechSynthesizer：文本转语音

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::error::ChatError;

/// 已提交的异步任务，仅在轮询窗口内存在
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub thread_id: String,
}

/// 任务状态（按后端原样保留，未知值放入 Other）
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    Other(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "requires_action" => Self::RequiresAction,
            "cancelling" => Self::Cancelling,
            "cancelled" => Self::Cancelled,
            "failed" => Self::Failed,
            "completed" => Self::Completed,
            "incomplete" => Self::Incomplete,
            "expired" => Self::Expired,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Other(s) => s,
        }
    }

    /// 只有 completed / failed 视为终态，其余一律按「仍在运行」处理
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次状态查询的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobResult {
    pub status: JobStatus,
    /// 后端附带的错误描述（failed 时通常存在）
    pub last_error: Option<String>,
}

impl JobResult {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            last_error: None,
        }
    }
}

/// 结构化生成使用的函数描述（name + JSON Schema 参数）
#[derive(Clone, Debug)]
pub struct StructuredSchema {
    pub name: String,
    pub description: String,
    /// 发送给模型的 system 指令
    pub instruction: String,
    pub parameters: Value,
}

/// 对话线程与异步任务
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// 新建对话线程，返回线程 ID
    async fn create_thread(&self) -> Result<String, ChatError>;

    /// 以 user 身份向线程追加一条消息
    async fn submit_message(&self, thread_id: &str, content: &str) -> Result<(), ChatError>;

    /// 针对线程发起一次生成任务
    async fn submit_job(&self, thread_id: &str) -> Result<JobHandle, ChatError>;

    /// 查询任务当前状态
    async fn poll_job(&self, job: &JobHandle) -> Result<JobResult, ChatError>;

    /// 取线程上最新一条生成消息的文本
    async fn fetch_latest_message(&self, thread_id: &str) -> Result<String, ChatError>;
}

/// 约束解码：返回符合 schema 的 JSON 文本（由调用方解析校验）
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate_structured(
        &self,
        schema: &StructuredSchema,
        prompt: &str,
    ) -> Result<String, ChatError>;
}

/// 语音合成请求
#[derive(Clone, Debug)]
pub struct SpeechRequest {
    pub input: String,
    /// 目前后端按文本自动识别语言，该字段仅记录
    pub lang: String,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// 合成音频，返回完整字节
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Bytes, ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_completed_and_failed_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        for s in ["queued", "in_progress", "cancelled", "expired", "requires_action", "weird"] {
            assert!(!JobStatus::parse(s).is_terminal(), "{s}");
        }
    }

    #[test]
    fn test_status_parse_keeps_unknown_value() {
        assert_eq!(JobStatus::parse("in_progress"), JobStatus::InProgress);
        let other = JobStatus::parse("paused");
        assert_eq!(other.as_str(), "paused");
        assert_eq!(other.to_string(), "paused");
    }
}
