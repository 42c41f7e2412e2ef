//! HTTP LLM Client - 调用 OpenAI 兼容的 Chat Completions 服务
//!
//! 实现 TextGeneratorPort trait
//!
//! 外部 API:
//! POST {base_url}/chat/completions
//! Request: {"model": "...", "messages": [...], "temperature": 0.8, "max_tokens": 1024, "stream": false}
//! Response: {"choices": [{"message": {"content": "..."}}], "usage": {...}}
//! 流式响应为 SSE：`data: {...}` 行，以 `data: [DONE]` 结束

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::application::ports::{
    GenerationRequest, GenerationResponse, ProviderError, StreamChunk, TextGeneratorPort,
    TextStream,
};
use crate::domain::generation::{estimate_tokens, TokenUsage};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatContent>,
    #[serde(default)]
    delta: Option<ChatContent>,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

/// HTTP LLM 客户端配置
#[derive(Debug, Clone)]
pub struct HttpLlmClientConfig {
    /// 服务基础 URL（如 https://api.openai.com/v1）
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
    /// 每 1k 输入 token 的价格（美元）
    pub input_cost_per_1k: f64,
    /// 每 1k 输出 token 的价格（美元）
    pub output_cost_per_1k: f64,
}

impl Default for HttpLlmClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 300,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
        }
    }
}

impl HttpLlmClientConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_pricing(mut self, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.input_cost_per_1k = input_per_1k;
        self.output_cost_per_1k = output_per_1k;
        self
    }

    /// 按配置价格估算费用
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 / 1000.0 * self.input_cost_per_1k
            + output_tokens as f64 / 1000.0 * self.output_cost_per_1k
    }
}

/// HTTP LLM 客户端
pub struct HttpLlmClient {
    client: Client,
    config: HttpLlmClientConfig,
}

impl HttpLlmClient {
    pub fn new(config: HttpLlmClientConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.base_url.trim_end_matches('/'))
    }

    fn usage(&self, usage: Option<ChatUsage>, request: &GenerationRequest, text: &str) -> TokenUsage {
        // 服务端没有返回用量时按字符数估算
        let (input, output) = match usage {
            Some(u) => (u.prompt_tokens, u.completion_tokens),
            None => (
                (estimate_tokens(&request.system_prompt) + estimate_tokens(&request.prompt)) as u64,
                estimate_tokens(text) as u64,
            ),
        };
        TokenUsage::new(input, output, self.config.cost(input, output))
    }

    async fn send(&self, request: &GenerationRequest, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &request.system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        let body = ChatRequest {
            model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
            stream,
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        };

        tracing::debug!(
            url = %self.completions_url(),
            model = %model,
            purpose = request.purpose.as_str(),
            prompt_len = request.prompt.len(),
            stream,
            "Sending chat completion request"
        );

        let mut builder = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(map_status(status, error_text));
        }
        Ok(response)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else if e.is_connect() {
        ProviderError::Network(format!("Cannot connect to model service: {}", e))
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// HTTP 状态码映射为错误类型
fn map_status(status: StatusCode, body: String) -> ProviderError {
    let message = format!("HTTP {}: {}", status, body);
    match status.as_u16() {
        429 => ProviderError::RateLimited(message),
        408 => ProviderError::ServiceUnavailable(message),
        401 | 403 => ProviderError::Authentication(message),
        400 | 404 | 422 => ProviderError::InvalidRequest(message),
        s if s >= 500 => ProviderError::ServiceUnavailable(message),
        _ => ProviderError::InvalidRequest(message),
    }
}

/// 从缓冲区取出一个完整行（含换行符）并按 UTF-8 解码
///
/// 多字节字符可能被拆在两次网络读取之间，只有完整的行才解码
fn next_line(buffer: &mut Vec<u8>) -> Option<Result<String, ProviderError>> {
    let pos = buffer.iter().position(|b| *b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=pos).collect();
    Some(String::from_utf8(line).map_err(|e| {
        ProviderError::InvalidResponse(format!("Stream line is not valid UTF-8: {}", e))
    }))
}

/// 解析一行 SSE；返回 None 表示忽略该行
fn parse_sse_line(line: &str) -> Option<Result<SseEvent, ProviderError>> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(SseEvent::Done));
    }
    Some(
        serde_json::from_str::<ChatChunk>(data)
            .map(SseEvent::Chunk)
            .map_err(|e| ProviderError::InvalidResponse(format!("Bad stream chunk: {}", e))),
    )
}

enum SseEvent {
    Chunk(ChatChunk),
    Done,
}

#[async_trait]
impl TextGeneratorPort for HttpLlmClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let response = self.send(&request, false).await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let text = body
            .choices
            .into_iter()
            .find_map(|c| c.message.and_then(|m| m.content))
            .ok_or_else(|| ProviderError::InvalidResponse("Response has no content".into()))?;
        let usage = self.usage(body.usage, &request, &text);
        let model = body
            .model
            .unwrap_or_else(|| request.model.clone().unwrap_or_else(|| self.config.model.clone()));

        tracing::info!(
            model = %model,
            purpose = request.purpose.as_str(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Chat completion finished"
        );

        Ok(GenerationResponse { text, usage, model })
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<TextStream, ProviderError> {
        let response = self.send(&request, true).await?;
        let fallback_model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.model.clone());
        let input_estimate =
            (estimate_tokens(&request.system_prompt) + estimate_tokens(&request.prompt)) as u64;
        let pricing = self.config.clone();

        struct StreamState {
            bytes: futures_util::stream::BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
            buffer: Vec<u8>,
            output_chars: usize,
            usage: Option<ChatUsage>,
            model: String,
            eof: bool,
            finished: bool,
        }

        let state = StreamState {
            bytes: response.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed(),
            buffer: Vec::new(),
            output_chars: 0,
            usage: None,
            model: fallback_model,
            eof: false,
            finished: false,
        };

        let stream = futures_util::stream::unfold(state, move |mut st| {
            let pricing = pricing.clone();
            async move {
                loop {
                    if st.finished {
                        return None;
                    }

                    // 先处理缓冲区中的完整行
                    if let Some(line) = next_line(&mut st.buffer) {
                        let line = match line {
                            Ok(line) => line,
                            Err(e) => {
                                st.finished = true;
                                return Some((Err(e), st));
                            }
                        };
                        match parse_sse_line(&line) {
                            None => continue,
                            Some(Err(e)) => {
                                st.finished = true;
                                return Some((Err(e), st));
                            }
                            Some(Ok(SseEvent::Chunk(chunk))) => {
                                if let Some(model) = chunk.model {
                                    st.model = model;
                                }
                                if chunk.usage.is_some() {
                                    st.usage = chunk.usage;
                                }
                                let delta: String = chunk
                                    .choices
                                    .into_iter()
                                    .filter_map(|c| c.delta.and_then(|d| d.content))
                                    .collect();
                                if delta.is_empty() {
                                    continue;
                                }
                                st.output_chars += delta.chars().count();
                                return Some((Ok(StreamChunk::Delta(delta)), st));
                            }
                            Some(Ok(SseEvent::Done)) => {
                                st.finished = true;
                                let (input, output) = match st.usage {
                                    Some(u) => (u.prompt_tokens, u.completion_tokens),
                                    None => (input_estimate, st.output_chars.div_ceil(4) as u64),
                                };
                                let usage =
                                    TokenUsage::new(input, output, pricing.cost(input, output));
                                let model = st.model.clone();
                                return Some((Ok(StreamChunk::Done { usage, model }), st));
                            }
                        }
                    }

                    if st.eof {
                        st.finished = true;
                        return Some((
                            Err(ProviderError::InvalidResponse(
                                "Stream ended without [DONE]".into(),
                            )),
                            st,
                        ));
                    }

                    match st.bytes.next().await {
                        Some(Ok(bytes)) => st.buffer.extend_from_slice(&bytes),
                        Some(Err(e)) => {
                            st.finished = true;
                            return Some((Err(map_reqwest_error(e)), st));
                        }
                        None => {
                            // 连接结束：处理残留的最后一行
                            st.eof = true;
                            if st.buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                                st.buffer.push(b'\n');
                            }
                        }
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn health_check(&self) -> bool {
        let mut builder = self.client.get(self.models_url()).timeout(Duration::from_secs(5));
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        match builder.send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = HttpLlmClientConfig::new("http://example.com/v1", "writer-large")
            .with_timeout(60)
            .with_pricing(0.5, 1.5);
        assert_eq!(config.base_url, "http://example.com/v1");
        assert_eq!(config.model, "writer-large");
        assert_eq!(config.timeout_secs, 60);
        assert!((config.cost(2000, 1000) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(map_status(StatusCode::TOO_MANY_REQUESTS, String::new()), ProviderError::RateLimited(_)));
        assert!(matches!(map_status(StatusCode::BAD_GATEWAY, String::new()), ProviderError::ServiceUnavailable(_)));
        assert!(matches!(map_status(StatusCode::REQUEST_TIMEOUT, String::new()), ProviderError::ServiceUnavailable(_)));
        assert!(matches!(map_status(StatusCode::UNAUTHORIZED, String::new()), ProviderError::Authentication(_)));
        assert!(matches!(map_status(StatusCode::NOT_FOUND, String::new()), ProviderError::InvalidRequest(_)));
        assert!(map_status(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_transient());
        assert!(!map_status(StatusCode::UNPROCESSABLE_ENTITY, String::new()).is_transient());
    }

    #[test]
    fn test_parse_sse_lines() {
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("data: ").is_none());
        assert!(matches!(parse_sse_line("data: [DONE]"), Some(Ok(SseEvent::Done))));

        let line = r#"data: {"model":"m","choices":[{"delta":{"content":"Hi"}}]}"#;
        match parse_sse_line(line) {
            Some(Ok(SseEvent::Chunk(chunk))) => {
                assert_eq!(chunk.model.as_deref(), Some("m"));
                assert_eq!(
                    chunk.choices[0].delta.as_ref().and_then(|d| d.content.as_deref()),
                    Some("Hi")
                );
            }
            _ => panic!("expected chunk"),
        }
        assert!(matches!(parse_sse_line("data: {oops"), Some(Err(ProviderError::InvalidResponse(_)))));
    }

    #[test]
    fn test_line_split_inside_multibyte_character() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"潮水\"}}]}\n";
        let bytes = line.as_bytes();
        // 切在“潮”的三个字节中间
        let split = line.find('潮').unwrap() + 1;

        let mut buffer = bytes[..split].to_vec();
        assert!(next_line(&mut buffer).is_none());
        buffer.extend_from_slice(&bytes[split..]);

        let decoded = next_line(&mut buffer).unwrap().unwrap();
        assert!(buffer.is_empty());
        match parse_sse_line(&decoded) {
            Some(Ok(SseEvent::Chunk(chunk))) => assert_eq!(
                chunk.choices[0].delta.as_ref().and_then(|d| d.content.as_deref()),
                Some("潮水")
            ),
            _ => panic!("expected chunk"),
        }
    }

    #[test]
    fn test_invalid_utf8_line_is_rejected() {
        let mut buffer = vec![b'd', b':', 0xff, b'\n', b'x'];
        assert!(matches!(
            next_line(&mut buffer),
            Some(Err(ProviderError::InvalidResponse(_)))
        ));
        assert_eq!(buffer, vec![b'x']);
    }
}
