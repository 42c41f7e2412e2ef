//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::application::pipeline::{StepKind, StepPolicy};
use crate::application::PipelineConfig;
use crate::domain::generation::{BudgetWeights, Severity, TokenBudgetAllocator};
use crate::infrastructure::adapters::{FakeLlmClientConfig, HttpLlmClientConfig};

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 模型服务配置
    #[serde(default)]
    pub llm: LlmConfig,

    /// 流水线与质量门配置
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Token 预算配置
    #[serde(default)]
    pub budget: BudgetConfig,

    /// 后台 worker 配置
    #[serde(default)]
    pub worker: WorkerConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 请求体大小上限（字节）
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5080
}

fn default_body_limit() -> usize {
    4 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 模型服务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI 兼容的 HTTP 服务
    #[default]
    Http,
    /// 离线确定性生成器
    Fake,
}

/// 模型服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    /// 服务基础 URL
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// 默认模型
    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// 请求超时时间（秒）
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// 每 1k 输入 token 的价格（美元）
    #[serde(default)]
    pub input_cost_per_1k: f64,

    /// 每 1k 输出 token 的价格（美元）
    #[serde(default)]
    pub output_cost_per_1k: f64,

    /// fake 模式下每次调用的人为延迟（毫秒）
    #[serde(default)]
    pub fake_latency_ms: u64,
}

fn default_llm_base_url() -> String {
    "http://localhost:8000/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            timeout_secs: default_llm_timeout(),
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
            fake_latency_ms: 0,
        }
    }
}

impl LlmConfig {
    pub fn http_client_config(&self) -> HttpLlmClientConfig {
        let config = HttpLlmClientConfig::new(&self.base_url, &self.model)
            .with_timeout(self.timeout_secs)
            .with_pricing(self.input_cost_per_1k, self.output_cost_per_1k);
        match &self.api_key {
            Some(key) if !key.is_empty() => config.with_api_key(key),
            _ => config,
        }
    }

    pub fn fake_client_config(&self) -> FakeLlmClientConfig {
        FakeLlmClientConfig {
            model: self.model.clone(),
            latency_ms: self.fake_latency_ms,
            ..FakeLlmClientConfig::default()
        }
    }
}

/// 流水线与质量门配置
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// 达到该严重度的问题阻止通过质量门（minor / moderate / major / critical）
    #[serde(default = "default_severity_threshold")]
    pub severity_threshold: String,

    /// 修订轮数上限
    #[serde(default = "default_max_revision_iterations")]
    pub max_revision_iterations: u32,

    /// 重试退避基数（毫秒）
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// 模型上下文窗口（token）
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// 每个会话进度通道的容量
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,

    /// 按步骤名覆盖必需性与重试策略，如 `[generation.steps.style-check]`
    #[serde(default)]
    pub steps: BTreeMap<String, StepPolicyOverride>,
}

/// 单个步骤的策略覆盖；未设置的字段沿用默认策略
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StepPolicyOverride {
    pub required: Option<bool>,
    pub retryable: Option<bool>,
    pub max_retries: Option<u32>,
}

impl StepPolicyOverride {
    pub fn apply(&self, base: StepPolicy) -> StepPolicy {
        StepPolicy {
            required: self.required.unwrap_or(base.required),
            retryable: self.retryable.unwrap_or(base.retryable),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
        }
    }
}

fn default_severity_threshold() -> String {
    "major".to_string()
}

fn default_max_revision_iterations() -> u32 {
    2
}

fn default_retry_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_context_window() -> usize {
    128_000
}

fn default_progress_capacity() -> usize {
    256
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            severity_threshold: default_severity_threshold(),
            max_revision_iterations: default_max_revision_iterations(),
            retry_backoff_ms: default_retry_backoff(),
            max_backoff_ms: default_max_backoff(),
            context_window: default_context_window(),
            progress_capacity: default_progress_capacity(),
            steps: BTreeMap::new(),
        }
    }
}

impl GenerationConfig {
    pub fn severity(&self) -> Option<Severity> {
        Severity::from_str(&self.severity_threshold)
    }

    /// 解析步骤策略覆盖；步骤名中的下划线视同连字符
    ///
    /// 未知步骤名返回该名字
    pub fn step_policies(&self) -> Result<Vec<(StepKind, StepPolicy)>, String> {
        self.steps
            .iter()
            .map(|(name, patch)| {
                let kind = StepKind::from_name(&name.trim().to_lowercase().replace('_', "-"))
                    .ok_or_else(|| name.clone())?;
                Ok((kind, patch.apply(kind.default_policy())))
            })
            .collect()
    }

    /// 严重度无法解析时回退到 major（加载时已校验）
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            severity_threshold: self.severity().unwrap_or(Severity::Major),
            max_revision_iterations: self.max_revision_iterations,
            retry_backoff_ms: self.retry_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

/// Token 预算配置
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    /// 各部分权重
    #[serde(default)]
    pub weights: BudgetWeights,

    /// 为模型输出预留的 token
    #[serde(default = "default_reserved_tokens")]
    pub reserved_tokens: usize,

    /// 有权重的部分至少分到的 token
    #[serde(default = "default_min_section_tokens")]
    pub min_section_tokens: usize,
}

fn default_reserved_tokens() -> usize {
    8_000
}

fn default_min_section_tokens() -> usize {
    64
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            weights: BudgetWeights::default(),
            reserved_tokens: default_reserved_tokens(),
            min_section_tokens: default_min_section_tokens(),
        }
    }
}

impl BudgetConfig {
    pub fn allocator(&self) -> TokenBudgetAllocator {
        TokenBudgetAllocator::new(
            self.weights.clone(),
            self.reserved_tokens,
            self.min_section_tokens,
        )
    }
}

/// 后台 worker 配置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// 同时运行的会话数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// 排队会话上限
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_max_concurrent() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/folio.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// 获取数据库 URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path)
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.addr(), "0.0.0.0:5080");
        assert_eq!(config.llm.provider, LlmProvider::Http);
        assert_eq!(config.generation.severity(), Some(Severity::Major));
        assert_eq!(config.worker.max_concurrent, 2);
        assert_eq!(config.database.database_url(), "sqlite:data/folio.db?mode=rwc");
    }

    #[test]
    fn test_pipeline_config() {
        let generation = GenerationConfig {
            severity_threshold: "Critical".to_string(),
            max_revision_iterations: 4,
            ..GenerationConfig::default()
        };
        let pipeline = generation.pipeline_config();
        assert_eq!(pipeline.severity_threshold, Severity::Critical);
        assert_eq!(pipeline.max_revision_iterations, 4);
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let llm = LlmConfig {
            api_key: Some(String::new()),
            ..LlmConfig::default()
        };
        assert!(llm.http_client_config().api_key.is_none());
    }
}
