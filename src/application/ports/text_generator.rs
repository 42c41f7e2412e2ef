//! Text Generator Port - 生成模型抽象
//!
//! 定义模型调用的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use thiserror::Error;

use crate::domain::generation::TokenUsage;

/// 模型服务错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),
}

impl ProviderError {
    /// 可重试的错误（限流、超时、网络、服务端错误、响应损坏）
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            ProviderError::InvalidRequest(_) | ProviderError::Authentication(_)
        )
    }
}

/// 请求用途（日志与测试故障注入使用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationPurpose {
    Outline,
    Scene,
    Revision,
}

impl GenerationPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationPurpose::Outline => "outline",
            GenerationPurpose::Scene => "scene",
            GenerationPurpose::Revision => "revision",
        }
    }
}

/// 生成请求
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub purpose: GenerationPurpose,
    pub system_prompt: String,
    pub prompt: String,
    /// 为空时使用服务端默认模型
    pub model: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// 生成响应
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// 流式响应片段
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// 增量文本
    Delta(String),
    /// 流结束，附带用量
    Done { usage: TokenUsage, model: String },
}

pub type TextStream = BoxStream<'static, Result<StreamChunk, ProviderError>>;

/// Text Generator Port
///
/// 外部生成模型服务的抽象接口
#[async_trait]
pub trait TextGeneratorPort: Send + Sync {
    /// 一次性生成
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError>;

    /// 流式生成
    ///
    /// 默认实现退化为一次性生成后整体返回
    async fn generate_stream(&self, request: GenerationRequest) -> Result<TextStream, ProviderError> {
        let response = self.generate(request).await?;
        let chunks = vec![
            Ok(StreamChunk::Delta(response.text)),
            Ok(StreamChunk::Done {
                usage: response.usage,
                model: response.model,
            }),
        ];
        Ok(stream::iter(chunks).boxed())
    }

    /// 默认模型名称
    fn default_model(&self) -> &str;

    /// 检查模型服务是否可用
    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::RateLimited("slow down".into()).is_transient());
        assert!(ProviderError::Timeout.is_transient());
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::ServiceUnavailable("502".into()).is_transient());
        assert!(!ProviderError::InvalidRequest("bad model".into()).is_transient());
        assert!(!ProviderError::Authentication("401".into()).is_transient());
    }
}
