//! Folio - 章节/全书生成编排服务
//!
//! - Domain: blueprint/, generation/, session/ (Bounded Contexts)
//! - Application: pipeline, orchestrator, commands, queries, ports
//! - Infrastructure: http, memory, worker, persistence, adapters, events

use std::sync::Arc;

use folio::application::{
    BookGenerationOrchestrator, ChapterGenerationPipeline, OrchestratorDeps, StepDependencies,
    StepRegistry, TextGeneratorPort,
};
use folio::config::{load_config, print_config, AppConfig, LlmProvider};
use folio::infrastructure::adapters::{
    BlueprintContextBuilder, FakeLlmClient, HeuristicContinuityChecker,
    HeuristicQualityEvaluator, HttpLlmClient,
};
use folio::infrastructure::events::ProgressPublisher;
use folio::infrastructure::http::{AppState, HttpServer, ServerConfig};
use folio::infrastructure::memory::{ChannelGenerationQueue, InMemorySessionRegistry};
use folio::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteBlueprintRepository,
    SqliteSessionRepository,
};
use folio::infrastructure::worker::{GenerationWorker, GenerationWorkerConfig};

fn init_tracing(config: &AppConfig) {
    let log_filter = format!(
        "{},folio={},tower_http=debug",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_generator(config: &AppConfig) -> anyhow::Result<Arc<dyn TextGeneratorPort>> {
    let generator: Arc<dyn TextGeneratorPort> = match config.llm.provider {
        LlmProvider::Http => Arc::new(HttpLlmClient::new(config.llm.http_client_config())?),
        LlmProvider::Fake => Arc::new(FakeLlmClient::new(config.llm.fake_client_config())),
    };
    Ok(generator)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);

    tracing::info!("Folio - chapter generation service");
    print_config(&config);

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // 初始化数据库
    let db_config = DatabaseConfig {
        database_url: config.database.database_url(),
        max_connections: config.database.max_connections,
    };
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;

    let session_repo = Arc::new(SqliteSessionRepository::new(pool.clone()));
    let blueprint_repo = Arc::new(SqliteBlueprintRepository::new(pool.clone()));

    // 模型服务与评估器
    let generator = build_generator(&config)?;
    let context_builder = Arc::new(BlueprintContextBuilder::new());
    let allocator = Arc::new(config.budget.allocator());
    let context_window = config.generation.context_window;

    let deps = StepDependencies {
        generator,
        context_builder: context_builder.clone(),
        quality: Arc::new(HeuristicQualityEvaluator::default()),
        continuity: Arc::new(HeuristicContinuityChecker::new()),
        allocator: allocator.clone(),
        context_window,
    };
    let mut registry = StepRegistry::standard(&deps);
    for (kind, policy) in config
        .generation
        .step_policies()
        .map_err(|name| anyhow::anyhow!("Unknown pipeline step: {}", name))?
    {
        tracing::info!(step = %kind, ?policy, "Step policy overridden");
        registry.set_policy(kind, policy);
    }
    let pipeline =
        ChapterGenerationPipeline::new(registry, config.generation.pipeline_config());

    let progress = ProgressPublisher::new(config.generation.progress_capacity).arc();

    let orchestrator = BookGenerationOrchestrator::new(OrchestratorDeps {
        pipeline,
        context_builder,
        allocator,
        context_window,
        sessions: session_repo,
        blueprints: blueprint_repo.clone(),
        registry: InMemorySessionRegistry::new().arc(),
        progress: progress.clone(),
    })
    .arc();

    // 上次进程中断的会话恢复为 Paused，由作者决定何时继续
    let restored = orchestrator.restore_sessions().await?;
    tracing::info!(restored, "Sessions restored");

    // 后台生成队列与 worker
    let (queue, queue_rx) = ChannelGenerationQueue::channel(config.worker.queue_capacity);
    let worker = GenerationWorker::new(
        GenerationWorkerConfig {
            max_concurrent: config.worker.max_concurrent,
        },
        queue_rx,
        orchestrator.clone(),
    );
    tokio::spawn(worker.run());

    let server_config = ServerConfig::new(&config.server.host, config.server.port)
        .with_body_limit(config.server.body_limit_bytes);
    let state = AppState::new(orchestrator, blueprint_repo, Arc::new(queue), progress);
    let server = HttpServer::new(server_config, state);

    // 启动服务器（带优雅关闭）
    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal");
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
