//! HTTP 端到端测试：会话 Cookie、线程复用、错误映射与 TTS

#![cfg(feature = "web")]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use threadline::backend::{JobStatus, ScriptedBackend};
use threadline::normalize::ResponseNormalizer;
use threadline::orchestrator::ConversationOrchestrator;
use threadline::poller::{JobPoller, PollPolicy};
use threadline::server::{router, AppState};
use threadline::session::{MemorySessionStore, SessionStore};

struct TestApp {
    app: Router,
    store: Arc<MemorySessionStore>,
    backend: Arc<ScriptedBackend>,
}

fn build_app(backend: ScriptedBackend, development: bool) -> TestApp {
    let store = Arc::new(MemorySessionStore::new());
    let backend = Arc::new(backend);
    let orchestrator = ConversationOrchestrator::new(
        store.clone(),
        backend.clone(),
        JobPoller::new(PollPolicy::new(3, Duration::from_millis(10))),
        ResponseNormalizer::new(backend.clone()),
    );
    let state = AppState::new(
        Arc::new(orchestrator),
        backend.clone(),
        Duration::from_secs(86_400),
        development,
    );
    TestApp {
        app: router(state),
        store,
        backend,
    }
}

fn post_json(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "flow-test");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// 从 Set-Cookie 中取出 `sessionToken=...` 部分
fn session_cookie(response: &axum::response::Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|pair| pair.trim().to_string())
}

#[tokio::test]
async fn test_new_client_gets_cookie_and_reply() {
    let t = build_app(ScriptedBackend::new().with_reply("Hi there!"), false);

    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/v1/messages", json!({"message": "Hello"}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("sessionToken="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Max-Age=86400"));

    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({"response": "Hi there!", "references": [], "img_url": []})
    );

    let token = set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("sessionToken="))
        .unwrap();
    let stored = t.store.find(token).await.unwrap().unwrap();
    assert!(stored.thread_id.is_some());
    assert_eq!(stored.chat.len(), 1);
    assert_eq!(stored.chat[0].message, "Hello");
    assert_eq!(stored.chat[0].response, "Hi there!");
    assert_eq!(stored.user_agent.as_deref(), Some("flow-test"));
    assert_eq!(t.backend.counts().threads_created, 1);
}

#[tokio::test]
async fn test_returning_client_reuses_thread() {
    let t = build_app(ScriptedBackend::new(), false);

    let first = t
        .app
        .clone()
        .oneshot(post_json("/api/v1/messages", json!({"message": "one"}), None))
        .await
        .unwrap();
    let cookie = session_cookie(&first).unwrap();
    let token = cookie.strip_prefix("sessionToken=").unwrap().to_string();
    let thread_before = t.store.find(&token).await.unwrap().unwrap().thread_id;

    let second = t
        .app
        .clone()
        .oneshot(post_json(
            "/api/v1/messages",
            json!({"message": "two"}),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert!(second.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(
        body_json(second).await["response"],
        "Echo from Mock: two"
    );

    let stored = t.store.find(&token).await.unwrap().unwrap();
    assert_eq!(stored.thread_id, thread_before);
    assert_eq!(stored.chat.len(), 2);
    assert_eq!(t.backend.counts().threads_created, 1);
    assert_eq!(t.store.session_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unknown_token_is_404_without_new_session() {
    let t = build_app(ScriptedBackend::new(), false);

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/api/v1/messages",
            json!({"message": "Hello"}),
            Some("sessionToken=does-not-exist"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_json(response).await, json!({"error": "Session not found"}));
    assert_eq!(t.store.session_count().await.unwrap(), 0);
    assert_eq!(t.backend.counts().threads_created, 0);
}

#[tokio::test]
async fn test_job_timeout_is_500_and_history_unchanged() {
    let t = build_app(ScriptedBackend::new().never_finishes(), false);

    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/v1/messages", json!({"message": "slow"}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let cookie = session_cookie(&response).unwrap();
    assert_eq!(
        body_json(response).await,
        json!({"error": "Internal server error"})
    );

    let token = cookie.strip_prefix("sessionToken=").unwrap();
    let stored = t.store.find(token).await.unwrap().unwrap();
    assert!(stored.chat.is_empty());
    // 线程已创建并绑定，下次请求继续使用
    assert!(stored.thread_id.is_some());
    assert_eq!(t.backend.counts().polls, 3);
}

#[tokio::test]
async fn test_failed_job_is_500() {
    let t = build_app(
        ScriptedBackend::new().with_statuses([JobStatus::InProgress, JobStatus::Failed]),
        false,
    );

    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/v1/messages", json!({"message": "x"}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(t.backend.counts().structured_calls, 0);
}

#[tokio::test]
async fn test_tts_returns_mp3_attachment() {
    let t = build_app(ScriptedBackend::new(), false);

    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/v1/tts", json!({"message": "read me"}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"speech.mp3\""
    );
    // TTS 不需要会话
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xFB]);
    assert_eq!(&bytes[2..], b"read me");
}

#[tokio::test]
async fn test_tts_failure_carries_details() {
    let t = build_app(ScriptedBackend::new(), false);

    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/v1/tts", json!({"message": ""}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Internal server error");
    assert!(body["details"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn test_session_route_only_in_development() {
    let dev = build_app(ScriptedBackend::new(), true);
    for path in ["/api/v1", "/api/v1/"] {
        let response = dev
            .app
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        assert!(session_cookie(&response).is_some());
        let body = body_json(response).await;
        assert!(body["session"]["chat"].as_array().unwrap().is_empty());
    }
    assert_eq!(dev.store.session_count().await.unwrap(), 2);

    let prod = build_app(ScriptedBackend::new(), false);
    for path in ["/api/v1", "/api/v1/"] {
        let response = prod
            .app
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }
    assert_eq!(prod.store.session_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_body_creates_no_session() {
    let t = build_app(ScriptedBackend::new(), false);

    for body in [json!({}), json!({"message": 42})] {
        let response = t
            .app
            .clone()
            .oneshot(post_json("/api/v1/messages", body, None))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    assert_eq!(t.store.session_count().await.unwrap(), 0);
    assert_eq!(t.backend.counts().threads_created, 0);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let t = build_app(ScriptedBackend::new(), false);

    let response = t
        .app
        .clone()
        .oneshot(Request::get("/nowhere").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        json!({"error": "/nowhere route not found"})
    );
}
