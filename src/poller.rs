//! 任务轮询：在有限次数内等待后端异步任务进入终态
//!
//! 后端不推送完成通知，只能采样：每次查询一次状态，非终态时协作式 sleep（只挂起当前请求的 task）。

use std::time::Duration;

use crate::backend::{AssistantBackend, JobHandle, JobResult, JobStatus};
use crate::error::ChatError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// 轮询策略：最多 max_attempts 次，间隔 interval
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct JobPoller {
    policy: PollPolicy,
}

impl JobPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// 轮询直到 completed（Ok）或 failed（JobFailed）；超过次数上限返回 JobTimeout
    pub async fn await_completion(
        &self,
        backend: &dyn AssistantBackend,
        job: &JobHandle,
    ) -> Result<JobResult, ChatError> {
        for attempt in 1..=self.policy.max_attempts {
            let result = backend.poll_job(job).await?;
            tracing::trace!(run_id = %job.id, attempt, status = %result.status, "polled job");

            if result.status.is_terminal() {
                if result.status == JobStatus::Completed {
                    return Ok(result);
                }
                tracing::warn!(
                    run_id = %job.id,
                    attempt,
                    status = %result.status,
                    error = result.last_error.as_deref().unwrap_or("-"),
                    "job failed"
                );
                return Err(ChatError::JobFailed {
                    status: result.status.to_string(),
                });
            }

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        tracing::warn!(
            run_id = %job.id,
            attempts = self.policy.max_attempts,
            "job did not finish in time"
        );
        Err(ChatError::JobTimeout {
            attempts: self.policy.max_attempts,
        })
    }
}
