//! # Soiree Runtime
//!
//! Execution and wiring layer for the Soiree planning substrate:
//! - AgentRegistry / DomainAgent: the per-domain agent seam
//! - AgentRuntime: lifecycle wrapper (timeout, retry, coalescing)
//! - Budget / FinalPlan aggregators: reactive derived views
//! - Orchestrator: connects bus + store + router + scheduler
//! - Bootstrap: build a running app from a single `soiree.yaml`

mod aggregator;
pub mod bootstrap;
pub mod builtin;
mod orchestrator;
mod registry;
mod runtime;

pub use aggregator::{BudgetAggregator, FinalPlanAggregator};
pub use bootstrap::{BootstrapError, RuntimeApp};
pub use orchestrator::{InputReceipt, Orchestrator, OrchestratorError};
pub use registry::{AgentError, AgentRegistry, DomainAgent};
pub use runtime::{AgentRuntime, RuntimeConfig};
