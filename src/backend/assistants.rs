//! OpenAI Assistants（threads / runs）REST 客户端
//!
//! 直接用 reqwest 调用：请求体简单、需要 `OpenAI-Beta` 头，响应里只取用到的字段。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::openai::OpenAiEndpoint;
use super::traits::{AssistantBackend, JobHandle, JobResult, JobStatus};
use crate::error::ChatError;

const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// 绑定到单个 assistant_id 的线程 / 任务后端
pub struct OpenAiAssistants {
    endpoint: OpenAiEndpoint,
    assistant_id: String,
}

impl OpenAiAssistants {
    pub fn new(endpoint: OpenAiEndpoint, assistant_id: impl Into<String>) -> Self {
        Self {
            endpoint,
            assistant_id: assistant_id.into(),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.endpoint
            .http
            .post(self.endpoint.url(path))
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.endpoint
            .http
            .get(self.endpoint.url(path))
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RunError {
    fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(msg)) => format!("{code}: {msg}"),
            (None, Some(msg)) => msg.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageContent {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: String,
}

/// 取最新消息的第一段文本内容
fn first_text(list: MessageList) -> Option<String> {
    list.data
        .into_iter()
        .next()?
        .content
        .into_iter()
        .find_map(|c| match c {
            MessageContent::Text { text } => Some(text.value),
            MessageContent::Other => None,
        })
}

#[async_trait]
impl AssistantBackend for OpenAiAssistants {
    async fn create_thread(&self) -> Result<String, ChatError> {
        let thread: ObjectRef = self
            .endpoint
            .send_json(self.post("threads").json(&json!({})))
            .await?;
        tracing::debug!(thread_id = %thread.id, "created thread");
        Ok(thread.id)
    }

    async fn submit_message(&self, thread_id: &str, content: &str) -> Result<(), ChatError> {
        let _: ObjectRef = self
            .endpoint
            .send_json(
                self.post(&format!("threads/{thread_id}/messages"))
                    .json(&json!({ "role": "user", "content": content })),
            )
            .await?;
        Ok(())
    }

    async fn submit_job(&self, thread_id: &str) -> Result<JobHandle, ChatError> {
        let run: RunObject = self
            .endpoint
            .send_json(
                self.post(&format!("threads/{thread_id}/runs"))
                    .json(&json!({ "assistant_id": self.assistant_id })),
            )
            .await?;
        tracing::debug!(thread_id, run_id = %run.id, status = %run.status, "submitted run");
        Ok(JobHandle {
            id: run.id,
            thread_id: thread_id.to_string(),
        })
    }

    async fn poll_job(&self, job: &JobHandle) -> Result<JobResult, ChatError> {
        let run: RunObject = self
            .endpoint
            .send_json(self.get(&format!("threads/{}/runs/{}", job.thread_id, job.id)))
            .await?;
        Ok(JobResult {
            status: JobStatus::parse(&run.status),
            last_error: run.last_error.as_ref().map(RunError::describe),
        })
    }

    async fn fetch_latest_message(&self, thread_id: &str) -> Result<String, ChatError> {
        let list: MessageList = self
            .endpoint
            .send_json(
                self.get(&format!("threads/{thread_id}/messages"))
                    .query(&[("limit", "1"), ("order", "desc")]),
            )
            .await?;
        first_text(list).ok_or_else(|| {
            ChatError::Upstream(format!("thread {thread_id} has no text message"))
        })
    }
}
