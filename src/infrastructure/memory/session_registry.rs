//! In-Memory Session Registry Implementation

use dashmap::DashMap;
use std::sync::Arc;

use crate::application::ports::{SessionRegistryPort, SessionSlot};
use crate::domain::session::SessionId;

/// 内存会话注册表
pub struct InMemorySessionRegistry {
    slots: DashMap<SessionId, Arc<SessionSlot>>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for InMemorySessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistryPort for InMemorySessionRegistry {
    fn insert(&self, slot: Arc<SessionSlot>) {
        let id = *slot.id();
        if self.slots.insert(id, slot).is_some() {
            tracing::warn!(session_id = %id, "Session slot replaced");
        } else {
            tracing::debug!(session_id = %id, "Session slot registered");
        }
    }

    fn get(&self, id: &SessionId) -> Option<Arc<SessionSlot>> {
        self.slots.get(id).map(|s| s.value().clone())
    }

    fn remove(&self, id: &SessionId) -> Option<Arc<SessionSlot>> {
        self.slots.remove(id).map(|(_, slot)| slot)
    }

    fn list(&self) -> Vec<Arc<SessionSlot>> {
        self.slots.iter().map(|e| e.value().clone()).collect()
    }
}
