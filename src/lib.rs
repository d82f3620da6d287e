//! Threadline - 匿名会话的 AI 对话中转服务
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **error**: 统一错误类型 ChatError
//! - **session**: 匿名会话、Cookie 与会话存储（内存 / SQLite）
//! - **backend**: 助手线程 / 任务、结构化抽取、语音合成的后端抽象与实现（OpenAI / Mock）
//! - **poller**: 异步任务轮询
//! - **normalize**: 回复清洗与结构化
//! - **orchestrator**: 单轮对话编排
//! - **server**: HTTP 路由与中间件（web feature）
//! - **shutdown**: 优雅关闭
//! - **observability**: tracing 日志初始化

pub mod backend;
pub mod config;
pub mod error;
pub mod normalize;
pub mod observability;
pub mod orchestrator;
pub mod poller;
#[cfg(feature = "web")]
pub mod server;
pub mod session;
pub mod shutdown;

pub use error::ChatError;
pub use orchestrator::{ConversationOrchestrator, MessageReply};
