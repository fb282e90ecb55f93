//! # Soiree Core
//!
//! Core abstractions and deterministic logic for the Soiree planning substrate.
//!
//! This crate contains:
//! - Session / Input / AgentResult / NormalizedPlan definitions
//! - Complexity Router (fast-path vs slow-path decision)
//! - Input Classifier abstraction
//! - Dependency Graph and the Dependency Scheduler decision core
//! - SessionStore abstraction
//!
//! This crate does NOT care about:
//! - How events are fanned out to subscribers
//! - How agent executions are spawned or retried
//! - How output is transported or displayed

pub mod classifier;
pub mod graph;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{InputClassifier, KeywordClassifier};
    pub use crate::graph::{DependencyGraph, GraphError};
    pub use crate::router::{
        ComplexityAssessment, ComplexityRouter, FastExtractor, FieldExtractor, PlanError,
        RoutePath, RoutedPlan, RouterConfig, RouterWeights, SlowPlanner,
    };
    pub use crate::scheduler::{DependencyScheduler, Directive, ScheduleReason};
    pub use crate::store::{SessionStore, StoreError};
    pub use crate::types::{
        AgentResult, AgentState, Budget, BudgetLine, CorrelationId, Domain, FinalPlan, Input,
        InputId, InputSource, NormalizedPlan, PlanSection, SectionStatus, Session, SessionId,
        SessionStatus,
    };
}

// Re-export key types at crate root
pub use classifier::{InputClassifier, KeywordClassifier};
pub use graph::DependencyGraph;
pub use router::{ComplexityAssessment, ComplexityRouter, RoutedPlan};
pub use scheduler::{DependencyScheduler, Directive, ScheduleReason};
pub use store::{SessionStore, StoreError};
pub use types::{
    AgentResult, AgentState, Budget, Domain, FinalPlan, Input, InputId, NormalizedPlan, Session,
    SessionId,
};
