//! 结构化抽取请求测试：本地 axum 桩服务记录 chat/completions 请求体

#![cfg(feature = "web")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use threadline::backend::{OpenAiEndpoint, OpenAiStructured, StructuredGenerator};
use threadline::normalize::{answer_schema, parse_structured, ANSWER_FUNCTION_NAME};

type Captured = Arc<Mutex<Option<Value>>>;

async fn completions(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
    *captured.lock().unwrap() = Some(body);
    Json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_700_000_000u32,
        "model": "gpt-3.5-turbo",
        "choices": [{
            "index": 0,
            "finish_reason": "tool_calls",
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": ANSWER_FUNCTION_NAME,
                        "arguments": "{\"response\":\"Paris is the capital.\",\"references\":[]}"
                    }
                }]
            }
        }]
    }))
}

/// 启动桩服务，返回 base_url 与请求体记录
async fn spawn_stub() -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(None));
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(captured.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/v1", addr), captured)
}

#[tokio::test]
async fn test_extraction_forces_answer_function() {
    let (base_url, captured) = spawn_stub().await;
    let endpoint =
        OpenAiEndpoint::new(Some(base_url.as_str()), Some("sk-test"), Duration::from_secs(5)).unwrap();
    let generator = OpenAiStructured::new(&endpoint, "gpt-3.5-turbo");

    let raw = generator
        .generate_structured(&answer_schema(), "Paris is the capital.")
        .await
        .unwrap();
    let answer = parse_structured(&raw).unwrap();
    assert_eq!(answer.response, "Paris is the capital.");

    let body = captured.lock().unwrap().take().unwrap();
    assert_eq!(body["model"], "gpt-3.5-turbo");
    assert_eq!(
        body["tool_choice"],
        json!({ "type": "function", "function": { "name": ANSWER_FUNCTION_NAME } })
    );
    assert_eq!(body["tools"][0]["function"]["name"], ANSWER_FUNCTION_NAME);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "Paris is the capital.");
}
