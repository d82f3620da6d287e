//! HTTP 服务：路由、会话中间件与应用状态装配
//!
//! 路由挂在 `/api/v1` 下：
//! - `POST /messages`：需要会话（请求体有效时解析，缺失则创建并下发 Cookie）
//! - `POST /tts`：文本转语音，不需要会话
//! - `GET /`（带或不带结尾斜杠）：仅 development 环境，返回当前会话

pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;

use crate::backend::{
    AssistantBackend, OpenAiAssistants, OpenAiEndpoint, OpenAiSpeech, OpenAiStructured,
    ScriptedBackend, SpeechSynthesizer, SpeechVoice, StructuredGenerator,
};
use crate::config::AppConfig;
use crate::normalize::ResponseNormalizer;
use crate::orchestrator::ConversationOrchestrator;
use crate::poller::JobPoller;
use crate::session::{create_session_store, SessionStore};

pub use error::ApiError;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub cookie_max_age: Duration,
    /// 是否开放 GET / 诊断接口
    pub development: bool,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<ConversationOrchestrator>,
        speech: Arc<dyn SpeechSynthesizer>,
        cookie_max_age: Duration,
        development: bool,
    ) -> Self {
        Self {
            orchestrator,
            speech,
            cookie_max_age,
            development,
        }
    }

    /// 按配置装配存储、后端与编排器
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn SessionStore> = create_session_store(cfg.storage.db_path.as_deref())
            .await
            .context("Failed to open session store")?;

        let backends = if cfg.llm.is_mock() {
            tracing::warn!("Using mock backend: replies echo the user message");
            Backends::mock()
        } else {
            Backends::openai(cfg)?
        };

        let orchestrator = ConversationOrchestrator::new(
            store,
            backends.assistant,
            JobPoller::new(cfg.poll.policy()),
            ResponseNormalizer::new(backends.structured),
        );

        Ok(Self::new(
            Arc::new(orchestrator),
            backends.speech,
            cfg.server.cookie_max_age(),
            cfg.server.is_development(),
        ))
    }
}

/// 三种后端能力的具体实现
struct Backends {
    assistant: Arc<dyn AssistantBackend>,
    structured: Arc<dyn StructuredGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
}

impl Backends {
    fn mock() -> Self {
        let mock = Arc::new(ScriptedBackend::new());
        Self {
            assistant: mock.clone(),
            structured: mock.clone(),
            speech: mock,
        }
    }

    fn openai(cfg: &AppConfig) -> anyhow::Result<Self> {
        let assistant_id = cfg
            .llm
            .assistant_id()
            .context("llm.assistant_id (or ASSISTANT_ID) is required for the openai provider")?;
        let endpoint = OpenAiEndpoint::new(
            cfg.llm.base_url.as_deref(),
            cfg.llm.api_key.as_deref(),
            cfg.llm.request_timeout(),
        )
        .context("Failed to build HTTP client")?;
        let voice = SpeechVoice {
            model: cfg.tts.model.clone(),
            voice: cfg.tts.voice.clone(),
            speed: cfg.tts.speed,
            format: cfg.tts.format.clone(),
        };
        Ok(Self {
            assistant: Arc::new(OpenAiAssistants::new(endpoint.clone(), assistant_id)),
            structured: Arc::new(OpenAiStructured::new(&endpoint, &cfg.llm.extraction_model)),
            speech: Arc::new(OpenAiSpeech::new(endpoint, voice)),
        })
    }
}

/// 构建完整路由
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/messages", post(handlers::post_message))
        .route("/tts", post(handlers::post_tts));

    let mut app = Router::new().nest("/api/v1", api);
    if state.development {
        let diagnostic = get(handlers::get_session).route_layer(
            axum::middleware::from_fn_with_state(state.clone(), middleware::resolve_session),
        );
        app = app
            .route("/api/v1", diagnostic.clone())
            .route("/api/v1/", diagnostic);
    }

    app.fallback(handlers::not_found).with_state(state)
}
