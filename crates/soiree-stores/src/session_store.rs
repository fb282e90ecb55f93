//! SessionStore in-memory implementation.
//!
//! The session map is guarded by its own lock, distinct from the per-session
//! locks, so creating sessions never contends with mutating existing ones.
//! Operations on the same session serialize on that session's mutex;
//! operations on different sessions never contend.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::Mutex;

use soiree_core::store::{SessionStore, StoreError};
use soiree_core::types::{
    AgentResult, Budget, FinalPlan, Input, Session, SessionId, SessionStatus,
};

/// In-memory implementation for a single running process.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl InMemorySessionStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, session_id: &str) -> Result<Arc<Mutex<Session>>, StoreError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, id: &str) -> Result<Session, StoreError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        if sessions.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        let session = Session::new(id);
        sessions.insert(id.to_string(), Arc::new(Mutex::new(session.clone())));
        Ok(session)
    }

    async fn add_input(&self, session_id: &str, input: Input) -> Result<Input, StoreError> {
        let entry = self.entry(session_id)?;
        let mut session = entry.lock().await;
        session.add_input(input.clone());
        Ok(input)
    }

    async fn remove_input(&self, session_id: &str, input_id: &str) -> Result<Input, StoreError> {
        let entry = self.entry(session_id)?;
        let mut session = entry.lock().await;
        session
            .remove_input(input_id)
            .ok_or_else(|| StoreError::NotFound(input_id.to_string()))
    }

    async fn set_agent_result(
        &self,
        session_id: &str,
        result: AgentResult,
    ) -> Result<(), StoreError> {
        let entry = self.entry(session_id)?;
        let mut session = entry.lock().await;
        session.set_result(result);
        Ok(())
    }

    async fn agent_result(
        &self,
        session_id: &str,
        domain: &str,
    ) -> Result<Option<AgentResult>, StoreError> {
        let entry = self.entry(session_id)?;
        let session = entry.lock().await;
        Ok(session.result(domain).cloned())
    }

    async fn remove_agent_result(
        &self,
        session_id: &str,
        domain: &str,
    ) -> Result<Option<AgentResult>, StoreError> {
        let entry = self.entry(session_id)?;
        let mut session = entry.lock().await;
        Ok(session.clear_result(domain))
    }

    async fn set_budget(&self, session_id: &str, budget: Budget) -> Result<(), StoreError> {
        let entry = self.entry(session_id)?;
        let mut session = entry.lock().await;
        session.set_budget(budget);
        Ok(())
    }

    async fn budget(&self, session_id: &str) -> Result<Option<Budget>, StoreError> {
        let entry = self.entry(session_id)?;
        let session = entry.lock().await;
        Ok(session.budget.clone())
    }

    async fn set_final_plan(&self, session_id: &str, plan: FinalPlan) -> Result<(), StoreError> {
        let entry = self.entry(session_id)?;
        let mut session = entry.lock().await;
        session.set_final_plan(plan);
        Ok(())
    }

    async fn final_plan(&self, session_id: &str) -> Result<Option<FinalPlan>, StoreError> {
        let entry = self.entry(session_id)?;
        let session = entry.lock().await;
        Ok(session.final_plan.clone())
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), StoreError> {
        let entry = self.entry(session_id)?;
        let mut session = entry.lock().await;
        session.set_status(status);
        Ok(())
    }

    async fn snapshot(&self, session_id: &str) -> Result<Session, StoreError> {
        let entry = self.entry(session_id)?;
        let session = entry.lock().await;
        Ok(session.clone())
    }

    async fn session_ids(&self) -> Result<Vec<SessionId>, StoreError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(sessions.keys().cloned().collect())
    }
}
