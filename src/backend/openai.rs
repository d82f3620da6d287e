//! OpenAI 兼容端点：连接参数、结构化抽取（async_openai 函数调用）、语音合成
//!
//! 线程 / 任务接口见 `assistants.rs`；三者共用同一个 OpenAiEndpoint。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionMessageToolCalls, ChatCompletionNamedToolChoice, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolChoiceOption, ChatCompletionTools,
    CreateChatCompletionRequestArgs, FunctionName, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::traits::{SpeechRequest, SpeechSynthesizer, StructuredGenerator, StructuredSchema};
use crate::error::ChatError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// 端点连接参数：HTTP 客户端、base_url、API Key
#[derive(Clone)]
pub struct OpenAiEndpoint {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEndpoint")
            .field("base_url", &self.base_url)
            .field("api_key_len", &self.api_key.len())
            .finish()
    }
}

impl OpenAiEndpoint {
    /// api_key 未提供时读取 OPENAI_API_KEY
    pub fn new(
        base_url: Option<&str>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());
        let base_url = base_url
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// 发送请求；非 2xx 时带上响应体作为错误信息
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ChatError> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Upstream(format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ChatError> {
        Ok(self.send(request).await?.json::<T>().await?)
    }

    fn openai_client(&self) -> Client<OpenAIConfig> {
        let config = OpenAIConfig::new()
            .with_api_base(&self.base_url)
            .with_api_key(&self.api_key);
        Client::with_config(config)
    }
}

/// 基于 chat completion 函数调用的结构化抽取
pub struct OpenAiStructured {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiStructured {
    pub fn new(endpoint: &OpenAiEndpoint, model: &str) -> Self {
        Self {
            client: endpoint.openai_client(),
            model: model.to_string(),
        }
    }

    fn build_messages(
        schema: &StructuredSchema,
        prompt: &str,
    ) -> Result<Vec<ChatCompletionRequestMessage>, ChatError> {
        Ok(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(schema.instruction.clone())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.to_string())
                .build()?
                .into(),
        ])
    }
}

#[async_trait]
impl StructuredGenerator for OpenAiStructured {
    async fn generate_structured(
        &self,
        schema: &StructuredSchema,
        prompt: &str,
    ) -> Result<String, ChatError> {
        let tool = ChatCompletionTools::Function(ChatCompletionTool {
            function: FunctionObjectArgs::default()
                .name(&schema.name)
                .description(&schema.description)
                .parameters(schema.parameters.clone())
                .build()?,
        });

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::build_messages(schema, prompt)?)
            .tools(vec![tool])
            // 强制调用该函数，不允许模型直接输出文本
            .tool_choice(ChatCompletionToolChoiceOption::Function(
                ChatCompletionNamedToolChoice {
                    function: FunctionName {
                        name: schema.name.clone(),
                    },
                },
            ))
            .build()?;

        let response = self.client.chat().create(request).await?;

        let choice = response.choices.first().ok_or_else(|| {
            ChatError::MalformedStructuredResponse("completion has no choices".to_string())
        })?;

        choice
            .message
            .tool_calls
            .iter()
            .flatten()
            .find_map(|call| match call {
                ChatCompletionMessageToolCalls::Function(f) if f.function.name == schema.name => {
                    Some(f.function.arguments.clone())
                }
                _ => None,
            })
            .ok_or_else(|| {
                ChatError::MalformedStructuredResponse(format!(
                    "completion did not call `{}`",
                    schema.name
                ))
            })
    }
}

/// 语音合成参数
#[derive(Clone, Debug)]
pub struct SpeechVoice {
    pub model: String,
    pub voice: String,
    pub speed: f32,
    pub format: String,
}

/// POST /audio/speech
pub struct OpenAiSpeech {
    endpoint: OpenAiEndpoint,
    voice: SpeechVoice,
}

impl OpenAiSpeech {
    pub fn new(endpoint: OpenAiEndpoint, voice: SpeechVoice) -> Self {
        Self { endpoint, voice }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Bytes, ChatError> {
        tracing::debug!(
            chars = request.input.chars().count(),
            lang = %request.lang,
            voice = %self.voice.voice,
            "synthesizing speech"
        );
        let body = json!({
            "model": self.voice.model,
            "input": request.input,
            "voice": self.voice.voice,
            "speed": self.voice.speed,
            "response_format": self.voice.format,
        });
        let response = self
            .endpoint
            .send(self.endpoint.http.post(self.endpoint.url("audio/speech")).json(&body))
            .await?;
        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_joins_cleanly() {
        let ep = OpenAiEndpoint::new(Some("http://localhost:9000/v1/"), Some("k"), Duration::from_secs(5))
            .unwrap();
        assert_eq!(ep.url("/threads"), "http://localhost:9000/v1/threads");
        assert_eq!(ep.url("audio/speech"), "http://localhost:9000/v1/audio/speech");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let ep = OpenAiEndpoint::new(None, Some("sk-secret"), Duration::from_secs(5)).unwrap();
        let dbg = format!("{ep:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains(DEFAULT_BASE_URL));
    }
}
