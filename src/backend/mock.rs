//! 脚本化后端（用于测试与 `provider = "mock"`，无需 API）
//!
//! 默认行为：任务首次轮询即 completed，回复回显用户最后一条消息；
//! 结构化抽取把清洗后的文本原样放入 `response`。可按需替换状态序列与返回内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use super::traits::{
    AssistantBackend, JobHandle, JobResult, JobStatus, SpeechRequest, SpeechSynthesizer,
    StructuredGenerator, StructuredSchema,
};
use crate::error::ChatError;

#[derive(Debug, Default)]
struct Script {
    statuses: VecDeque<JobStatus>,
    /// 状态序列耗尽后的状态；None 表示 completed
    fallback_status: Option<JobStatus>,
    reply: Option<String>,
    structured: Option<String>,
    fail_thread_creation: bool,
}

/// 调用计数，供测试断言
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub threads_created: usize,
    pub messages_submitted: usize,
    pub jobs_submitted: usize,
    pub polls: usize,
    pub structured_calls: usize,
}

#[derive(Debug, Default)]
struct State {
    script: Script,
    counts: CallCounts,
    last_message: Option<String>,
    last_prompt: Option<String>,
}

/// 同时实现三个后端 trait 的内存后端
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    state: Mutex<State>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 固定助手回复文本
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.edit(|s| s.script.reply = Some(reply.into()))
    }

    /// 依次返回的任务状态
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        self.edit(|s| s.script.statuses = statuses.into_iter().collect())
    }

    /// 任务永远停留在 in_progress
    pub fn never_finishes(self) -> Self {
        self.edit(|s| s.script.fallback_status = Some(JobStatus::InProgress))
    }

    /// 固定结构化抽取返回的 JSON 文本
    pub fn with_structured(self, raw_json: impl Into<String>) -> Self {
        self.edit(|s| s.script.structured = Some(raw_json.into()))
    }

    pub fn failing_thread_creation(self) -> Self {
        self.edit(|s| s.script.fail_thread_creation = true)
    }

    pub fn counts(&self) -> CallCounts {
        self.lock().counts.clone()
    }

    /// 最近一次送入结构化抽取的文本
    pub fn last_prompt(&self) -> Option<String> {
        self.lock().last_prompt.clone()
    }

    fn edit(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut self.lock());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // 中毒时沿用内部数据
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AssistantBackend for ScriptedBackend {
    async fn create_thread(&self) -> Result<String, ChatError> {
        let mut state = self.lock();
        if state.script.fail_thread_creation {
            return Err(ChatError::Upstream("thread creation refused".to_string()));
        }
        state.counts.threads_created += 1;
        Ok(format!("thread_mock_{}", state.counts.threads_created))
    }

    async fn submit_message(&self, _thread_id: &str, content: &str) -> Result<(), ChatError> {
        let mut state = self.lock();
        state.counts.messages_submitted += 1;
        state.last_message = Some(content.to_string());
        Ok(())
    }

    async fn submit_job(&self, thread_id: &str) -> Result<JobHandle, ChatError> {
        let mut state = self.lock();
        state.counts.jobs_submitted += 1;
        Ok(JobHandle {
            id: format!("run_mock_{}", state.counts.jobs_submitted),
            thread_id: thread_id.to_string(),
        })
    }

    async fn poll_job(&self, _job: &JobHandle) -> Result<JobResult, ChatError> {
        let mut state = self.lock();
        state.counts.polls += 1;
        let status = match state.script.statuses.pop_front() {
            Some(status) => status,
            None => state
                .script
                .fallback_status
                .clone()
                .unwrap_or(JobStatus::Completed),
        };
        let mut result = JobResult::new(status);
        if result.status == JobStatus::Failed {
            result.last_error = Some("scripted failure".to_string());
        }
        Ok(result)
    }

    async fn fetch_latest_message(&self, _thread_id: &str) -> Result<String, ChatError> {
        let state = self.lock();
        if let Some(reply) = &state.script.reply {
            return Ok(reply.clone());
        }
        Ok(format!(
            "Echo from Mock: {}",
            state.last_message.as_deref().unwrap_or("(no input)")
        ))
    }
}

#[async_trait]
impl StructuredGenerator for ScriptedBackend {
    async fn generate_structured(
        &self,
        _schema: &StructuredSchema,
        prompt: &str,
    ) -> Result<String, ChatError> {
        let mut state = self.lock();
        state.counts.structured_calls += 1;
        state.last_prompt = Some(prompt.to_string());
        if let Some(raw) = &state.script.structured {
            return Ok(raw.clone());
        }
        Ok(json!({
            "response": prompt,
            "references": [],
            "support_images": [],
        })
        .to_string())
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedBackend {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Bytes, ChatError> {
        if request.input.is_empty() {
            return Err(ChatError::Upstream("input must not be empty".to_string()));
        }
        // 伪造的 MPEG 帧头 + 文本，便于测试识别
        let mut audio = vec![0xFF, 0xFB];
        audio.extend_from_slice(request.input.as_bytes());
        Ok(Bytes::from(audio))
    }
}
