//! Agent registry module
//!
//! DomainAgent is the seam for domain-specific logic (theme detection,
//! venue search, ...). Agents are black boxes to the runtime: they receive
//! a session snapshot plus their contributing inputs and return an opaque
//! payload with a confidence score.
//!
//! The registry is populated once at startup and immutable afterwards; it
//! is passed by reference into the runtime, never mutated.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use soiree_core::types::{Domain, Input, Session};

/// Agent execution errors
#[derive(Debug, Error)]
pub enum AgentError {
    /// Transient failure worth retrying (network hiccup, busy backend)
    #[error("{0}")]
    Retryable(String),

    /// Permanent failure; retrying will not help
    #[error("{0}")]
    Fatal(String),
}

impl AgentError {
    /// Whether the runtime should retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Retryable(_))
    }
}

/// DomainAgent trait - one implementation per planning domain.
///
/// Implementations may perform I/O but must be safe to invoke concurrently
/// for different sessions, must tolerate missing upstream context, and are
/// expected to respect the cancellation token at their own suspension
/// points (cancellation is best-effort).
#[async_trait]
pub trait DomainAgent: Send + Sync {
    /// Domain this agent owns (must be unique in a registry)
    fn domain(&self) -> &str;

    /// Short description of what the agent recommends
    fn description(&self) -> &str;

    /// Produce a recommendation payload and a confidence score (0.0 - 1.0)
    async fn run(
        &self,
        snapshot: &Session,
        inputs: &[Input],
        cancel: CancellationToken,
    ) -> Result<(Value, f64), AgentError>;
}

/// AgentRegistry - immutable domain-to-agent map
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<Domain, Arc<dyn DomainAgent>>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent; call only during startup, before the registry is
    /// shared. A second agent for the same domain replaces the first.
    pub fn register(&mut self, agent: Arc<dyn DomainAgent>) {
        self.agents.insert(agent.domain().to_string(), agent);
    }

    /// Look up the agent owning a domain
    pub fn get(&self, domain: &str) -> Option<Arc<dyn DomainAgent>> {
        self.agents.get(domain).cloned()
    }

    /// Check whether a domain has an agent
    pub fn contains(&self, domain: &str) -> bool {
        self.agents.contains_key(domain)
    }

    /// Registered domain names, sorted
    pub fn domains(&self) -> Vec<Domain> {
        let mut names: Vec<Domain> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }
}
