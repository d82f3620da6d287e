//! Threadline HTTP 服务入口
//!
//! 初始化日志、加载配置、装配应用状态，绑定端口并在收到关闭信号后优雅退出。

use std::net::SocketAddr;

use anyhow::Context;
use threadline::config::load_config;
use threadline::server::{router, AppState};
use threadline::shutdown::Shutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    threadline::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let state = AppState::from_config(&cfg).await?;
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cfg.server.host, cfg.server.port))?;

    let shutdown = Shutdown::new();
    shutdown.install_signal_handlers();

    tracing::info!(
        environment = %cfg.server.environment,
        provider = %cfg.llm.provider,
        "Threadline listening on http://{}",
        addr
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().wait())
        .await
        .context("Server error")?;

    tracing::info!(reason = ?shutdown.reason(), "Server stopped");
    Ok(())
}
