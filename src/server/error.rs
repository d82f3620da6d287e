//! HTTP 错误映射
//!
//! 处理函数统一返回 `Result<T, ApiError>`：会话不存在映射为 404，其余一律 500。
//! 内部错误只写日志，不把细节返回给客户端。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::ChatError;

#[derive(Debug)]
pub enum ApiError {
    Chat(ChatError),
    /// 未注册的路径
    RouteNotFound(String),
    Internal(String),
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        ApiError::Chat(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Chat(e) if e.is_not_found() => {
                (StatusCode::NOT_FOUND, "Session not found".to_string())
            }
            ApiError::RouteNotFound(path) => {
                (StatusCode::NOT_FOUND, format!("{path} route not found"))
            }
            ApiError::Chat(e) => {
                tracing::error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Internal(m) => {
                tracing::error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
