//! 优雅关闭：监听 Ctrl+C / SIGTERM，通过 CancellationToken 通知 HTTP 服务停止接收新连接
//!
//! 进行中的请求（包括仍在轮询的任务）会在连接关闭前跑完。

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// 关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// 代码主动触发（测试或嵌入方）
    Requested,
}

/// 关闭信号
#[derive(Clone)]
pub struct Shutdown {
    token: CancellationToken,
    reason_tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (reason_tx, _) = watch::channel(None);
        Self {
            token: CancellationToken::new(),
            reason_tx: Arc::new(reason_tx),
        }
    }

    /// 触发关闭；只记录第一次的原因
    pub fn trigger(&self, reason: ShutdownReason) {
        self.reason_tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
        self.token.cancel();
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason_tx.borrow()
    }

    /// 等待关闭信号（可直接传给 axum 的 with_graceful_shutdown）
    pub async fn wait(self) {
        self.token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                shutdown.trigger(ShutdownReason::Interrupt);
            }
        });

        #[cfg(unix)]
        {
            let shutdown = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    shutdown.trigger(ShutdownReason::Terminate);
                }
            });
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_records_first_reason() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.token.is_cancelled());
        assert_eq!(shutdown.reason(), None);

        shutdown.trigger(ShutdownReason::Terminate);
        shutdown.trigger(ShutdownReason::Interrupt);

        assert!(shutdown.token.is_cancelled());
        assert_eq!(shutdown.reason(), Some(ShutdownReason::Terminate));
    }

    #[tokio::test]
    async fn test_wait_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let waiter = tokio::spawn(shutdown.clone().wait());
        shutdown.trigger(ShutdownReason::Requested);
        waiter.await.unwrap();
    }
}
