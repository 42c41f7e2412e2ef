//! Application State
//!
//! 包含所有 Command/Query Handlers 的应用状态

use std::sync::Arc;

use crate::application::{
    // Command handlers
    ApproveChapterHandler, CancelSessionHandler, GenerateChapterHandler, PauseSessionHandler,
    RegenerateChapterHandler, ResumeSessionHandler, ReviseChapterHandler, SaveBlueprintHandler,
    StartGenerationHandler,
    // Query handlers
    GetBlueprintHandler, GetSessionHandler, GetStatisticsHandler, ListBlueprintsHandler,
    ListSessionsHandler,
    // Orchestrator & ports
    BlueprintRepositoryPort, BookGenerationOrchestrator, GenerationQueuePort,
    ProgressPublisherPort,
};

/// 应用状态
pub struct AppState {
    // ========== Services ==========
    pub orchestrator: Arc<BookGenerationOrchestrator>,
    pub progress: Arc<dyn ProgressPublisherPort>,

    // ========== Command Handlers ==========
    pub save_blueprint_handler: SaveBlueprintHandler,
    pub start_generation_handler: StartGenerationHandler,
    pub generate_chapter_handler: GenerateChapterHandler,
    pub pause_session_handler: PauseSessionHandler,
    pub resume_session_handler: ResumeSessionHandler,
    pub cancel_session_handler: CancelSessionHandler,
    pub regenerate_chapter_handler: RegenerateChapterHandler,
    pub approve_chapter_handler: ApproveChapterHandler,
    pub revise_chapter_handler: ReviseChapterHandler,

    // ========== Query Handlers ==========
    pub get_blueprint_handler: GetBlueprintHandler,
    pub list_blueprints_handler: ListBlueprintsHandler,
    pub get_session_handler: GetSessionHandler,
    pub get_statistics_handler: GetStatisticsHandler,
    pub list_sessions_handler: ListSessionsHandler,
}

impl AppState {
    /// 创建应用状态
    pub fn new(
        orchestrator: Arc<BookGenerationOrchestrator>,
        blueprint_repo: Arc<dyn BlueprintRepositoryPort>,
        queue: Arc<dyn GenerationQueuePort>,
        progress: Arc<dyn ProgressPublisherPort>,
    ) -> Self {
        Self {
            orchestrator: orchestrator.clone(),
            progress,

            // Command handlers
            save_blueprint_handler: SaveBlueprintHandler::new(blueprint_repo.clone()),
            start_generation_handler: StartGenerationHandler::new(
                orchestrator.clone(),
                queue.clone(),
            ),
            generate_chapter_handler: GenerateChapterHandler::new(orchestrator.clone()),
            pause_session_handler: PauseSessionHandler::new(orchestrator.clone()),
            resume_session_handler: ResumeSessionHandler::new(orchestrator.clone(), queue.clone()),
            cancel_session_handler: CancelSessionHandler::new(orchestrator.clone()),
            regenerate_chapter_handler: RegenerateChapterHandler::new(orchestrator.clone()),
            approve_chapter_handler: ApproveChapterHandler::new(orchestrator.clone(), queue),
            revise_chapter_handler: ReviseChapterHandler::new(orchestrator.clone()),

            // Query handlers
            get_blueprint_handler: GetBlueprintHandler::new(blueprint_repo.clone()),
            list_blueprints_handler: ListBlueprintsHandler::new(blueprint_repo),
            get_session_handler: GetSessionHandler::new(orchestrator.clone()),
            get_statistics_handler: GetStatisticsHandler::new(orchestrator.clone()),
            list_sessions_handler: ListSessionsHandler::new(orchestrator),
        }
    }
}
