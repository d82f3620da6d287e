//! 会话层：匿名会话的创建 / 查找、线程绑定与对话历史追加
//!
//! - `model`：Session / ChatEntry 文档结构
//! - `store`：SessionStore trait 与内存实现
//! - `sqlite`：SQLite 实现（async-sqlite feature）
//! - `cookie`：会话 Cookie 读写

pub mod cookie;
pub mod model;
pub mod sqlite;
pub mod store;

use std::time::Duration;

pub use cookie::{token_from_cookie_header, SessionCookie, DEFAULT_COOKIE_MAX_AGE, SESSION_COOKIE};
pub use model::{mint_token, ChatEntry, Session, SessionToken};
#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteSessionStore;
pub use store::{create_session_store, MemorySessionStore, SessionStore};

use crate::error::ChatError;

/// ensure_session 的结果：会话本身，以及首次创建时需要下发的 Cookie
#[derive(Clone, Debug)]
pub struct ResolvedSession {
    pub session: Session,
    pub set_cookie: Option<SessionCookie>,
}

/// 解析请求对应的会话
///
/// 未携带令牌：生成新令牌，创建并持久化空会话，附带需要设置的 Cookie。
/// 携带令牌：从存储读取；存储中不存在时返回 `SessionNotFound`，不会新建会话。
pub async fn ensure_session(
    store: &dyn SessionStore,
    token: Option<&str>,
    user_agent: Option<&str>,
    cookie_max_age: Duration,
) -> Result<ResolvedSession, ChatError> {
    match token {
        Some(token) => {
            let session = store.find(token).await?.ok_or(ChatError::SessionNotFound)?;
            Ok(ResolvedSession {
                session,
                set_cookie: None,
            })
        }
        None => {
            let session = Session::new(mint_token(), user_agent.map(String::from));
            store.insert(&session).await?;
            tracing::info!(session = session.token_prefix(), "created new session");
            let set_cookie = SessionCookie::new(session.token.clone(), cookie_max_age);
            Ok(ResolvedSession {
                session,
                set_cookie: Some(set_cookie),
            })
        }
    }
}
