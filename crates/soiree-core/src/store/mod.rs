//! Store module
//!
//! SessionStore is the per-session state container abstraction. The core
//! only defines the contract; the in-memory implementation lives in
//! soiree-stores, and a durable store is an external collaborator satisfying
//! the same trait.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    AgentResult, Budget, FinalPlan, Input, Session, SessionId, SessionStatus,
};

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Item already exists: {0}")]
    AlreadyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// SessionStore trait - async interface over per-session state.
///
/// Concurrency contract: operations on different sessions never contend;
/// operations on the same session serialize. Every mutating call bumps the
/// session's version counter. There is no compare-and-swap: callers that
/// read-then-write across an await point must re-read if they need
/// atomicity (accepted race window for a single-process cache).
///
/// Operating on an unknown session ID returns `StoreError::NotFound`,
/// never a silent no-op.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new session. Fails with `AlreadyExists` on a duplicate ID.
    async fn create_session(&self, id: &str) -> Result<Session, StoreError>;

    /// Append an input; returns the stored input snapshot.
    async fn add_input(&self, session_id: &str, input: Input) -> Result<Input, StoreError>;

    /// Soft-delete an input; returns the flagged input snapshot.
    async fn remove_input(&self, session_id: &str, input_id: &str) -> Result<Input, StoreError>;

    /// Set (or replace) a domain's agent result slot.
    async fn set_agent_result(
        &self,
        session_id: &str,
        result: AgentResult,
    ) -> Result<(), StoreError>;

    /// Read a domain's agent result slot.
    async fn agent_result(
        &self,
        session_id: &str,
        domain: &str,
    ) -> Result<Option<AgentResult>, StoreError>;

    /// Clear a domain's agent result slot; returns the removed result.
    async fn remove_agent_result(
        &self,
        session_id: &str,
        domain: &str,
    ) -> Result<Option<AgentResult>, StoreError>;

    /// Set the derived budget.
    async fn set_budget(&self, session_id: &str, budget: Budget) -> Result<(), StoreError>;

    /// Read the derived budget.
    async fn budget(&self, session_id: &str) -> Result<Option<Budget>, StoreError>;

    /// Set the derived final plan.
    async fn set_final_plan(&self, session_id: &str, plan: FinalPlan) -> Result<(), StoreError>;

    /// Read the derived final plan.
    async fn final_plan(&self, session_id: &str) -> Result<Option<FinalPlan>, StoreError>;

    /// Update the session status.
    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), StoreError>;

    /// Immutable deep copy of the full session.
    async fn snapshot(&self, session_id: &str) -> Result<Session, StoreError>;

    /// IDs of all known sessions.
    async fn session_ids(&self) -> Result<Vec<SessionId>, StoreError>;
}
