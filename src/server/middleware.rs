//! 会话解析：读取 Cookie 中的令牌与 User-Agent，得到当前 Session；新会话需要附加 Set-Cookie
//!
//! `GET /` 通过 `resolve_session` 中间件解析；`POST /messages` 在请求体校验通过后由处理函数调用
//! `session_from_headers`，请求体无效时不会创建会话。

use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use super::error::ApiError;
use super::AppState;
use crate::session::{ensure_session, token_from_cookie_header, Session};

/// 解析出的会话，以及首次创建时的 Set-Cookie 值
pub struct RequestSession {
    pub session: Session,
    pub set_cookie: Option<HeaderValue>,
}

/// 新会话的 Set-Cookie 附加到响应上（成功与失败响应都需要）
pub fn append_set_cookie(response: &mut Response, set_cookie: Option<HeaderValue>) {
    if let Some(value) = set_cookie {
        response.headers_mut().append(SET_COOKIE, value);
    }
}

pub async fn session_from_headers(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<RequestSession, ApiError> {
    let token = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(token_from_cookie_header);
    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());

    let resolved = ensure_session(
        state.orchestrator.store().as_ref(),
        token,
        user_agent,
        state.cookie_max_age,
    )
    .await?;

    let set_cookie = resolved
        .set_cookie
        .map(|cookie| HeaderValue::from_str(&cookie.header_value()))
        .transpose()
        .map_err(|e| ApiError::Internal(format!("invalid cookie value: {e}")))?;

    Ok(RequestSession {
        session: resolved.session,
        set_cookie,
    })
}

/// 把 Session 放入请求扩展
pub async fn resolve_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let RequestSession {
        session,
        set_cookie,
    } = session_from_headers(&state, request.headers()).await?;
    request.extensions_mut().insert(session);
    let mut response = next.run(request).await;
    append_set_cookie(&mut response, set_cookie);
    Ok(response)
}
