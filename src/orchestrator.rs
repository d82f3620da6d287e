//! 对话编排：单条用户消息的完整处理流程
//!
//! Idle → ThreadEnsured → MessageSubmitted → JobSubmitted → Polling → Normalizing → Persisted → Responded，
//! 任一阶段失败即进入 Failed。只有前面各阶段全部成功才会写入对话历史，失败不留下部分记录。

use std::sync::Arc;

use serde::Serialize;

use crate::backend::AssistantBackend;
use crate::error::ChatError;
use crate::normalize::{ResponseNormalizer, StructuredAnswer};
use crate::poller::JobPoller;
use crate::session::{ChatEntry, Session, SessionStore};

/// 单次请求的处理阶段（用于日志与失败定位）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ThreadEnsured,
    MessageSubmitted,
    JobSubmitted,
    Polling,
    Normalizing,
    Persisted,
    Responded,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::ThreadEnsured => "thread_ensured",
            Stage::MessageSubmitted => "message_submitted",
            Stage::JobSubmitted => "job_submitted",
            Stage::Polling => "polling",
            Stage::Normalizing => "normalizing",
            Stage::Persisted => "persisted",
            Stage::Responded => "responded",
        }
    }
}

/// 返回给调用方的应答
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageReply {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_url: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<String>>,
}

impl From<StructuredAnswer> for MessageReply {
    fn from(answer: StructuredAnswer) -> Self {
        Self {
            response: answer.response,
            img_url: answer.support_images,
            references: answer.references,
        }
    }
}

/// 编排器：所有协作者显式注入，自身不持有跨请求状态
pub struct ConversationOrchestrator {
    store: Arc<dyn SessionStore>,
    backend: Arc<dyn AssistantBackend>,
    poller: JobPoller,
    normalizer: ResponseNormalizer,
}

/// 跟踪当前阶段，失败时带上阶段信息记录日志
struct Progress<'a> {
    session: &'a str,
    stage: Stage,
}

impl Progress<'_> {
    fn advance(&mut self, next: Stage, thread_id: Option<&str>) {
        tracing::debug!(
            session = self.session,
            thread_id = thread_id.unwrap_or("-"),
            from = self.stage.as_str(),
            to = next.as_str(),
            "conversation stage"
        );
        self.stage = next;
    }

    fn fail(&self, err: ChatError) -> ChatError {
        tracing::warn!(
            session = self.session,
            stage = self.stage.as_str(),
            error = %err,
            "conversation failed"
        );
        err
    }

    /// 线程已就绪之后的失败：带上线程 ID 以便调用方同步会话
    fn fail_on(&self, thread_id: &str, err: ChatError) -> (Option<String>, ChatError) {
        (Some(thread_id.to_string()), self.fail(err))
    }
}

impl ConversationOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        backend: Arc<dyn AssistantBackend>,
        poller: JobPoller,
        normalizer: ResponseNormalizer,
    ) -> Self {
        Self {
            store,
            backend,
            poller,
            normalizer,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// 处理一条用户消息；成功时会话历史恰好增加一条，并同步更新传入的 session
    pub async fn handle_message(
        &self,
        session: &mut Session,
        message: &str,
    ) -> Result<MessageReply, ChatError> {
        let mut progress = Progress {
            session: session.token_prefix(),
            stage: Stage::Idle,
        };
        let outcome = self.run(&mut progress, session.thread_id.clone(), &session.token, message).await;

        match outcome {
            Ok((thread_id, entry, reply)) => {
                session.thread_id = Some(thread_id);
                session.chat.push(entry);
                Ok(reply)
            }
            Err((thread_id, err)) => {
                // 线程可能已绑定成功，即使后续阶段失败也要反映到内存中的会话上
                if let Some(id) = thread_id {
                    session.thread_id = Some(id);
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        progress: &mut Progress<'_>,
        existing_thread: Option<String>,
        token: &str,
        message: &str,
    ) -> Result<(String, ChatEntry, MessageReply), (Option<String>, ChatError)> {
        let thread_id = self
            .ensure_thread(existing_thread, token)
            .await
            .map_err(|e| (None, progress.fail(e)))?;
        progress.advance(Stage::ThreadEnsured, Some(&thread_id));

        self.backend
            .submit_message(&thread_id, message)
            .await
            .map_err(|e| progress.fail_on(&thread_id, e))?;
        progress.advance(Stage::MessageSubmitted, Some(&thread_id));

        let job = self
            .backend
            .submit_job(&thread_id)
            .await
            .map_err(|e| progress.fail_on(&thread_id, e))?;
        progress.advance(Stage::JobSubmitted, Some(&thread_id));

        progress.advance(Stage::Polling, Some(&thread_id));
        self.poller
            .await_completion(self.backend.as_ref(), &job)
            .await
            .map_err(|e| progress.fail_on(&thread_id, e))?;

        let raw = self
            .backend
            .fetch_latest_message(&thread_id)
            .await
            .map_err(|e| progress.fail_on(&thread_id, e))?;
        progress.advance(Stage::Normalizing, Some(&thread_id));

        let answer = self
            .normalizer
            .normalize(&raw)
            .await
            .map_err(|e| progress.fail_on(&thread_id, e))?;

        let entry = ChatEntry {
            message: message.to_string(),
            response: answer.response.clone(),
            support_images: answer.support_images.clone(),
            references: answer.references.clone(),
            followup_questions: None,
        };
        self.store
            .append_chat_entry(token, &entry)
            .await
            .map_err(|e| progress.fail_on(&thread_id, e))?;
        progress.advance(Stage::Persisted, Some(&thread_id));

        progress.advance(Stage::Responded, Some(&thread_id));
        Ok((thread_id, entry, MessageReply::from(answer)))
    }

    /// 已有线程直接复用；否则向后端申请新线程并绑定（以存储中最终生效的 ID 为准）
    async fn ensure_thread(
        &self,
        existing: Option<String>,
        token: &str,
    ) -> Result<String, ChatError> {
        if let Some(id) = existing {
            return Ok(id);
        }
        let created = self.backend.create_thread().await?;
        let attached = self.store.attach_thread(token, &created).await?;
        if attached != created {
            tracing::info!(
                created = %created,
                kept = %attached,
                "session already had a thread; discarding the new one"
            );
        }
        Ok(attached)
    }
}
