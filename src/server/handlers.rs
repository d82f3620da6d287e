//! 路由处理函数

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use super::error::ApiError;
use super::middleware::{append_set_cookie, session_from_headers, RequestSession};
use super::AppState;
use crate::backend::SpeechRequest;
use crate::session::Session;

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub message: String,
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_lang() -> String {
    "en".to_string()
}

/// POST /messages：请求体通过校验后才解析 / 创建会话
pub async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<MessageRequest>,
) -> Result<Response, ApiError> {
    let RequestSession {
        mut session,
        set_cookie,
    } = session_from_headers(&state, &headers).await?;

    let mut response = match state
        .orchestrator
        .handle_message(&mut session, &body.message)
        .await
    {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    };
    append_set_cookie(&mut response, set_cookie);
    Ok(response)
}

/// GET /（仅 development）：返回当前会话
pub async fn get_session(Extension(session): Extension<Session>) -> Json<serde_json::Value> {
    Json(json!({ "session": session }))
}

/// POST /tts：返回 MP3 附件；失败时带上错误详情
pub async fn post_tts(State(state): State<AppState>, Json(body): Json<TtsRequest>) -> Response {
    let request = SpeechRequest {
        input: body.message,
        lang: body.lang,
    };
    match state.speech.synthesize(&request).await {
        Ok(audio) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "audio/mpeg")
            .header(
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"speech.mp3\"",
            )
            .body(Body::from(audio))
            .unwrap_or_else(|e| {
                ApiError::Internal(format!("failed to build audio response: {e}")).into_response()
            }),
        Err(e) => {
            tracing::error!(error = %e, "speech synthesis failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error", "details": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// 未匹配的路径
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::RouteNotFound(uri.path().to_string())
}
