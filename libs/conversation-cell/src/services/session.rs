// libs/conversation-cell/src/services/session.rs
use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::models::ConversationState;

/// One ConversationState per thread id. Turns within a thread are sequential
/// by contract; the lock only protects concurrent access across threads.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, ConversationState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn load_or_create(&self, thread_id: &str) -> ConversationState {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                debug!("Starting conversation thread {}", thread_id);
                ConversationState::new(thread_id)
            })
            .clone()
    }

    pub async fn save(&self, state: ConversationState) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(state.thread_id.clone(), state);
    }

    pub async fn get(&self, thread_id: &str) -> Option<ConversationState> {
        self.sessions.read().await.get(thread_id).cloned()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
