//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, LlmProvider};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// # 环境变量示例
/// - `FOLIO_SERVER__PORT=8080`
/// - `FOLIO_LLM__PROVIDER=fake`
/// - `FOLIO_LLM__API_KEY=sk-...`
/// - `FOLIO_GENERATION__SEVERITY_THRESHOLD=critical`
/// - `FOLIO_BUDGET__WEIGHTS__NARRATIVE=4`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// `config_path` 为 None 时搜索工作目录下的 config.toml / config.local.toml
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 默认值（最低优先级），按字段合并所以单独覆盖某个权重不会清零其余权重
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 5080)?
        .set_default("llm.provider", "http")?
        .set_default("llm.base_url", "http://localhost:8000/v1")?
        .set_default("llm.model", "gpt-4o-mini")?
        .set_default("llm.timeout_secs", 300)?
        .set_default("generation.severity_threshold", "major")?
        .set_default("generation.max_revision_iterations", 2)?
        .set_default("budget.weights.system_prompt", 1)?
        .set_default("budget.weights.narrative", 3)?
        .set_default("budget.weights.character", 2)?
        .set_default("budget.weights.world", 1)?
        .set_default("budget.weights.plot", 2)?
        .set_default("budget.weights.style", 1)?
        .set_default("budget.weights.chapter_instructions", 1)?
        .set_default("worker.max_concurrent", 2)?
        .set_default("database.path", "data/folio.db")?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 前缀 FOLIO_，层级分隔符 __（双下划线）
    builder = builder.add_source(
        Environment::with_prefix("FOLIO")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("Server port cannot be 0"));
    }

    if config.llm.provider == LlmProvider::Http {
        if config.llm.base_url.trim().is_empty() {
            return Err(invalid("LLM base URL cannot be empty"));
        }
        if config.llm.model.trim().is_empty() {
            return Err(invalid("LLM model cannot be empty"));
        }
    }

    if config.generation.severity().is_none() {
        return Err(invalid(format!(
            "Unknown severity threshold: {}",
            config.generation.severity_threshold
        )));
    }

    if let Err(name) = config.generation.step_policies() {
        return Err(invalid(format!("Unknown pipeline step in generation.steps: {}", name)));
    }

    if config.budget.weights.weighted_sections() == 0 {
        return Err(invalid("At least one budget weight must be non-zero"));
    }

    if config.budget.reserved_tokens >= config.generation.context_window {
        return Err(invalid(format!(
            "Reserved tokens ({}) must be smaller than the context window ({})",
            config.budget.reserved_tokens, config.generation.context_window
        )));
    }

    if config.worker.max_concurrent == 0 {
        return Err(invalid("Worker concurrency must be at least 1"));
    }

    if config.database.path.is_empty() {
        return Err(invalid("Database path cannot be empty"));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志），不输出 API key
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}", config.server.addr());
    tracing::info!("LLM Provider: {:?}", config.llm.provider);
    if config.llm.provider == LlmProvider::Http {
        tracing::info!("LLM Base URL: {}", config.llm.base_url);
        tracing::info!("LLM Timeout: {}s", config.llm.timeout_secs);
        tracing::info!(
            "LLM API Key: {}",
            if config.llm.api_key.is_some() { "set" } else { "not set" }
        );
    }
    tracing::info!("LLM Model: {}", config.llm.model);
    tracing::info!(
        "Quality Gate: severity >= {}, max {} revision(s)",
        config.generation.severity_threshold,
        config.generation.max_revision_iterations
    );
    tracing::info!(
        "Context Window: {} tokens ({} reserved)",
        config.generation.context_window,
        config.budget.reserved_tokens
    );
    tracing::info!("Worker Concurrency: {}", config.worker.max_concurrent);
    tracing::info!("Database: {}", config.database.path);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipeline::{StepKind, StepPolicy};
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
            [server]
            port = 9090

            [llm]
            provider = "fake"
            model = "offline"

            [budget.weights]
            narrative = 5
            "#,
        );
        let config = load_config_from_path(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.llm.provider, LlmProvider::Fake);
        assert_eq!(config.llm.model, "offline");
        assert_eq!(config.budget.weights.narrative, 5);
        // 未覆盖的权重保留默认值
        assert_eq!(config.budget.weights.character, 2);
    }

    #[test]
    fn test_invalid_threshold_in_file() {
        let file = write_config(
            r#"
            [generation]
            severity_threshold = "catastrophic"
            "#,
        );
        let err = load_config_from_path(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_step_policy_overrides() {
        let file = write_config(
            r#"
            [generation.steps.generate-outline]
            max_retries = 5

            [generation.steps.style_check]
            required = true
            retryable = false
            "#,
        );
        let config = load_config_from_path(Some(file.path())).unwrap();
        let policies = config.generation.step_policies().unwrap();
        assert_eq!(policies.len(), 2);
        assert!(policies.contains(&(StepKind::GenerateOutline, StepPolicy::new(true, true, 5))));
        assert!(policies.contains(&(StepKind::StyleCheck, StepPolicy::new(true, false, 1))));

        let file = write_config(
            r#"
            [generation.steps.polish]
            required = false
            "#,
        );
        match load_config_from_path(Some(file.path())) {
            Err(ConfigError::ValidationError(message)) => assert!(message.contains("polish")),
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            load_config_from_path(Some(&path)),
            Err(ConfigError::LoadError(_))
        ));
    }

    #[test]
    fn test_validation_passes_for_defaults() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.llm.model = " ".to_string();
        assert!(validate_config(&config).is_err());
        config.llm.provider = LlmProvider::Fake;
        assert!(validate_config(&config).is_ok());

        let mut config = AppConfig::default();
        config.budget.weights = crate::domain::generation::BudgetWeights {
            system_prompt: 0,
            narrative: 0,
            character: 0,
            world: 0,
            plot: 0,
            style: 0,
            chapter_instructions: 0,
        };
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.budget.reserved_tokens = config.generation.context_window;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.worker.max_concurrent = 0;
        assert!(validate_config(&config).is_err());
    }
}
