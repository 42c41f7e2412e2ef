//! Fake LLM Client - 离线生成器
//!
//! 不调用模型服务，按请求确定性地生成文本；用于本地运行和测试。
//! 支持按请求用途注入失败、人为延迟和阻塞闸门。

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::application::ports::{
    GenerationPurpose, GenerationRequest, GenerationResponse, ProviderError, StreamChunk,
    TextGeneratorPort, TextStream,
};
use crate::domain::generation::{estimate_tokens, TokenUsage};

const FILLER: &[&str] = &[
    "The", "tide", "pulled", "at", "the", "pier", "while", "gulls", "circled", "the", "lamp",
    "and", "the", "town", "held", "its", "breath",
];

/// Fake LLM Client 配置
#[derive(Debug, Clone)]
pub struct FakeLlmClientConfig {
    pub model: String,
    /// 每次调用的人为延迟（毫秒）
    pub latency_ms: u64,
    /// prompt 未指定时的大纲条目数
    pub outline_beats: usize,
    /// 场景字数上限
    pub max_scene_words: usize,
    /// 流式输出每个片段的词数
    pub chunk_words: usize,
}

impl Default for FakeLlmClientConfig {
    fn default() -> Self {
        Self {
            model: "fake-writer".to_string(),
            latency_ms: 0,
            outline_beats: 3,
            max_scene_words: 2000,
            chunk_words: 16,
        }
    }
}

/// Fake LLM Client
pub struct FakeLlmClient {
    config: FakeLlmClientConfig,
    failures: Mutex<HashMap<GenerationPurpose, VecDeque<ProviderError>>>,
    calls: Mutex<HashMap<GenerationPurpose, usize>>,
    revisions: AtomicUsize,
    last: Mutex<HashMap<GenerationPurpose, GenerationRequest>>,
    gate: Option<(GenerationPurpose, Arc<Semaphore>)>,
}

impl FakeLlmClient {
    pub fn new(config: FakeLlmClientConfig) -> Self {
        tracing::info!(
            model = %config.model,
            latency_ms = config.latency_ms,
            "FakeLlmClient initialized"
        );
        Self {
            config,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            revisions: AtomicUsize::new(0),
            last: Mutex::new(HashMap::new()),
            gate: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FakeLlmClientConfig::default())
    }

    /// 场景生成前需要从闸门取得许可
    pub fn with_scene_gate(self, gate: Arc<Semaphore>) -> Self {
        self.with_gate(GenerationPurpose::Scene, gate)
    }

    /// 指定用途的调用需要先从闸门取得许可
    pub fn with_gate(mut self, purpose: GenerationPurpose, gate: Arc<Semaphore>) -> Self {
        self.gate = Some((purpose, gate));
        self
    }

    /// 让指定用途的下一次调用失败（可多次调用排队）
    pub fn fail_next(&self, purpose: GenerationPurpose, error: ProviderError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.entry(purpose).or_default().push_back(error);
        }
    }

    /// 指定用途的调用次数（含失败）
    pub fn calls(&self, purpose: GenerationPurpose) -> usize {
        self.calls
            .lock()
            .map(|c| c.get(&purpose).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// 指定用途最近一次收到的请求
    pub fn last_request(&self, purpose: GenerationPurpose) -> Option<GenerationRequest> {
        self.last.lock().ok().and_then(|l| l.get(&purpose).cloned())
    }

    async fn before_call(&self, request: &GenerationRequest) -> Result<(), ProviderError> {
        let purpose = request.purpose;
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(purpose).or_insert(0) += 1;
        }
        if let Ok(mut last) = self.last.lock() {
            last.insert(purpose, request.clone());
        }
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
        if let Some((gated, gate)) = &self.gate {
            if *gated == purpose {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|e| ProviderError::ServiceUnavailable(e.to_string()))?;
                permit.forget();
            }
        }
        let injected = self
            .failures
            .lock()
            .ok()
            .and_then(|mut f| f.get_mut(&purpose).and_then(VecDeque::pop_front));
        match injected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn compose(&self, request: &GenerationRequest) -> String {
        match request.purpose {
            GenerationPurpose::Outline => (1..=number_after(&request.prompt, "exactly ")
                .unwrap_or(self.config.outline_beats)
                .clamp(1, 12))
                .map(|i| format!("{}. Beat {} of the chapter", i, i))
                .collect::<Vec<_>>()
                .join("\n"),
            GenerationPurpose::Scene => {
                let words = number_after(&request.prompt, "in about ")
                    .unwrap_or(200)
                    .clamp(1, self.config.max_scene_words);
                let mut text = String::new();
                if let Some(pov) = field(&request.prompt, "Point of view:") {
                    text.push_str(pov);
                    text.push(' ');
                }
                text.push_str(&filler(words));
                text.push('.');
                text
            }
            GenerationPurpose::Revision => {
                let pass = self.revisions.fetch_add(1, Ordering::SeqCst) + 1;
                let draft = section(&request.prompt, "## Current draft").unwrap_or_default();
                format!("{}\n\nRevision pass {}.", draft.trim(), pass)
            }
        }
    }

    fn usage(&self, request: &GenerationRequest, text: &str) -> TokenUsage {
        let input = estimate_tokens(&request.system_prompt) + estimate_tokens(&request.prompt);
        TokenUsage::new(input as u64, estimate_tokens(text) as u64, 0.0)
    }
}

/// 解析 prompt 中 `marker` 之后的数字（如 "in about 400 words"）
fn number_after(prompt: &str, marker: &str) -> Option<usize> {
    let idx = prompt.find(marker)?;
    prompt[idx + marker.len()..]
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

fn field<'a>(prompt: &'a str, prefix: &str) -> Option<&'a str> {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix(prefix))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn section<'a>(prompt: &'a str, header: &str) -> Option<&'a str> {
    let start = prompt.find(header)? + header.len();
    let rest = &prompt[start..];
    let end = rest.find("\n## ").unwrap_or(rest.len());
    let body = &rest[..end];
    // 最后一行是指令
    Some(body.rsplit_once("\n\n").map(|(b, _)| b).unwrap_or(body))
}

fn filler(words: usize) -> String {
    (0..words)
        .map(|i| FILLER[i % FILLER.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl TextGeneratorPort for FakeLlmClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        self.before_call(&request).await?;
        let text = self.compose(&request);
        tracing::debug!(
            purpose = request.purpose.as_str(),
            chars = text.len(),
            "FakeLlmClient: generated text"
        );
        Ok(GenerationResponse {
            usage: self.usage(&request, &text),
            model: request.model.unwrap_or_else(|| self.config.model.clone()),
            text,
        })
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<TextStream, ProviderError> {
        self.before_call(&request).await?;
        let text = self.compose(&request);
        let usage = self.usage(&request, &text);
        let model = request.model.unwrap_or_else(|| self.config.model.clone());

        let words: Vec<&str> = text.split(' ').collect();
        let mut chunks: Vec<Result<StreamChunk, ProviderError>> = words
            .chunks(self.config.chunk_words.max(1))
            .enumerate()
            .map(|(i, chunk)| {
                let joined = chunk.join(" ");
                Ok(StreamChunk::Delta(if i == 0 { joined } else { format!(" {}", joined) }))
            })
            .collect();
        chunks.push(Ok(StreamChunk::Done { usage, model }));
        Ok(stream::iter(chunks).boxed())
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(purpose: GenerationPurpose, prompt: &str) -> GenerationRequest {
        GenerationRequest {
            purpose,
            system_prompt: String::new(),
            prompt: prompt.to_string(),
            model: None,
            temperature: 0.7,
            max_output_tokens: 1024,
        }
    }

    #[tokio::test]
    async fn test_outline_has_numbered_beats() {
        let client = FakeLlmClient::with_defaults();
        let response = client
            .generate(request(GenerationPurpose::Outline, "outline please"))
            .await
            .unwrap();
        assert_eq!(response.text.lines().count(), 3);
        assert!(response.text.starts_with("1. "));
        assert_eq!(response.model, "fake-writer");
    }

    #[tokio::test]
    async fn test_scene_honors_requested_length_and_pov() {
        let client = FakeLlmClient::with_defaults();
        let prompt = "Point of view: Mara\nWrite scene 1 of 3 (x) in about 40 words. Output prose only.";
        let mut stream = client
            .generate_stream(request(GenerationPurpose::Scene, prompt))
            .await
            .unwrap();

        let mut text = String::new();
        let mut done = false;
        while let Some(chunk) = stream.next().await {
            match chunk.unwrap() {
                StreamChunk::Delta(d) => text.push_str(&d),
                StreamChunk::Done { usage, .. } => {
                    assert!(usage.output_tokens > 0);
                    done = true;
                }
            }
        }
        assert!(done);
        assert!(text.starts_with("Mara "));
        assert_eq!(text.split_whitespace().count(), 41);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let client = FakeLlmClient::with_defaults();
        client.fail_next(GenerationPurpose::Outline, ProviderError::Timeout);

        let first = client.generate(request(GenerationPurpose::Outline, "")).await;
        assert_eq!(first.unwrap_err(), ProviderError::Timeout);
        assert!(client.generate(request(GenerationPurpose::Outline, "")).await.is_ok());
        assert_eq!(client.calls(GenerationPurpose::Outline), 2);
        assert_eq!(client.calls(GenerationPurpose::Scene), 0);
    }

    #[tokio::test]
    async fn test_revision_keeps_draft() {
        let client = FakeLlmClient::with_defaults();
        let prompt = "## Current draft\nThe tide came in.\n\nRewrite the full chapter addressing every point above. Output prose only.\n";
        let response = client
            .generate(request(GenerationPurpose::Revision, prompt))
            .await
            .unwrap();
        assert_eq!(response.text, "The tide came in.\n\nRevision pass 1.");
    }
}
