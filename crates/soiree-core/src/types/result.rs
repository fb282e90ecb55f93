//! AgentResult type definitions
//!
//! AgentResult is the per (session, domain) slot with its lifecycle state
//! machine. ABSENT is modeled as absence from the session's result map.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Domain, InputId};

/// Agent lifecycle state machine
///
/// `ABSENT -> SCHEDULED -> RUNNING -> COMPLETED | FAILED`, and back to
/// ABSENT on invalidation (the slot is removed from the session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentState {
    /// Scheduled for execution, not yet started
    Scheduled,
    /// Currently executing
    Running,
    /// Execution completed successfully
    Completed,
    /// Execution failed
    Failed {
        /// Reason for failure
        error: String,
        /// Whether this failure is worth retrying
        retryable: bool,
    },
}

impl AgentState {
    /// Check if the state is terminal (no further transitions without a new trigger)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentState::Completed | AgentState::Failed { retryable: false, .. }
        )
    }

    /// Check if an execution is currently in flight or pending
    pub fn is_active(&self) -> bool {
        matches!(self, AgentState::Scheduled | AgentState::Running)
    }

    /// Check if the agent is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, AgentState::Running)
    }
}

/// AgentResult - the per (session, domain) result slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Domain this result belongs to
    pub domain: Domain,
    /// Current lifecycle state
    pub state: AgentState,
    /// Domain-specific payload (opaque to the core)
    #[serde(default)]
    pub payload: Value,
    /// Confidence score (0.0 - 1.0)
    #[serde(default)]
    pub confidence: f64,
    /// Input IDs that currently justify this result's existence
    #[serde(default)]
    pub contributing_inputs: BTreeSet<InputId>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl AgentResult {
    /// Create a freshly scheduled result slot
    pub fn scheduled(domain: impl Into<Domain>, contributing_inputs: BTreeSet<InputId>) -> Self {
        Self {
            domain: domain.into(),
            state: AgentState::Scheduled,
            payload: Value::Null,
            confidence: 0.0,
            contributing_inputs,
            updated_at: Utc::now(),
        }
    }

    /// Update the lifecycle state
    pub fn set_state(&mut self, state: AgentState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    /// Transition to running
    pub fn start_running(&mut self) {
        self.set_state(AgentState::Running);
    }

    /// Transition to completed with a payload
    pub fn complete(&mut self, payload: Value, confidence: f64) {
        self.payload = payload;
        self.confidence = confidence.clamp(0.0, 1.0);
        self.set_state(AgentState::Completed);
    }

    /// Transition to failed
    pub fn fail(&mut self, error: impl Into<String>, retryable: bool) {
        self.set_state(AgentState::Failed {
            error: error.into(),
            retryable,
        });
    }
}
