//! 会话 Cookie：读取请求头中的令牌，生成 Set-Cookie 值

use std::time::Duration;

/// Cookie 名称
pub const SESSION_COOKIE: &str = "sessionToken";

/// 默认有效期：24 小时
pub const DEFAULT_COOKIE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// 需要下发给客户端的会话 Cookie
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCookie {
    pub token: String,
    pub max_age: Duration,
}

impl SessionCookie {
    pub fn new(token: impl Into<String>, max_age: Duration) -> Self {
        Self {
            token: token.into(),
            max_age,
        }
    }

    /// Set-Cookie 头的值（HttpOnly）
    pub fn header_value(&self) -> String {
        format!(
            "{}={}; Max-Age={}; Path=/; HttpOnly",
            SESSION_COOKIE,
            self.token,
            self.max_age.as_secs()
        )
    }
}

/// 从 Cookie 请求头中取出会话令牌；空值视为未携带
pub fn token_from_cookie_header(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}
