//! Folio - 章节/全书生成编排服务
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Blueprint Context: 作者确认的全书蓝图
//! - Generation Context: Token 预算、生成产物、评估报告、统计
//! - Session Context: 全书生成会话状态机
//!
//! 应用层 (application/):
//! - Ports: 端口定义（TextGenerator, ContextBuilder, Evaluators, Repositories, Progress, Queue）
//! - Pipeline: 单章生成流水线（步骤注册表、重试、质量门修订循环）
//! - Orchestrator: 全书生成编排（暂停/恢复/取消/审批/修订）
//! - Commands / Queries: CQRS 处理器
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: RESTful API + WebSocket 进度推送
//! - Memory: 会话注册表、生成队列、内存仓储
//! - Worker: GenerationWorker 后台章节循环
//! - Persistence: SQLite 存储
//! - Adapters: LLM 客户端、上下文构建、启发式评估器
//! - Events: 进度事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
