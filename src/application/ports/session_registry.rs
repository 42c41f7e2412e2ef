//! Session Registry Port - 运行中会话的内存槽位
//!
//! 每个会话一个槽位：
//! - 会话互斥锁：串行化同一会话的所有修改
//! - 运行锁：同一会话的流水线按到达顺序排队执行
//! - 取消令牌：取消会话时通知正在运行的流水线

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::domain::blueprint::BookBlueprint;
use crate::domain::session::{GenerationSession, SessionId};

/// 会话槽位
pub struct SessionSlot {
    id: SessionId,
    blueprint: Arc<BookBlueprint>,
    session: Mutex<GenerationSession>,
    run_lock: Mutex<()>,
    cancel: CancellationToken,
}

impl SessionSlot {
    pub fn new(session: GenerationSession, blueprint: Arc<BookBlueprint>) -> Self {
        Self {
            id: *session.id(),
            blueprint,
            session: Mutex::new(session),
            run_lock: Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn blueprint(&self) -> &Arc<BookBlueprint> {
        &self.blueprint
    }

    /// 获取会话互斥锁
    pub async fn lock(&self) -> MutexGuard<'_, GenerationSession> {
        self.session.lock().await
    }

    /// 等待运行锁；持有期间其他流水线排队
    pub async fn run(&self) -> MutexGuard<'_, ()> {
        self.run_lock.lock().await
    }

    /// 是否有流水线正在运行
    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Session Registry Port
pub trait SessionRegistryPort: Send + Sync {
    fn insert(&self, slot: Arc<SessionSlot>);

    fn get(&self, id: &SessionId) -> Option<Arc<SessionSlot>>;

    fn remove(&self, id: &SessionId) -> Option<Arc<SessionSlot>>;

    fn list(&self) -> Vec<Arc<SessionSlot>>;
}
