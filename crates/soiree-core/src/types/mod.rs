//! Type definitions
//!
//! Session is the stateful planning context; Input, AgentResult and the
//! derived aggregates (Budget, FinalPlan) hang off it.

mod input;
mod plan;
mod result;
mod session;

pub use input::{Input, InputId, InputSource};
pub use plan::{Budget, BudgetLine, FinalPlan, NormalizedPlan, PlanSection, SectionStatus};
pub use result::{AgentResult, AgentState};
pub use session::{Session, SessionId, SessionStatus};

/// Type alias for a planning domain name (theme, venue, cake, budget, ...)
pub type Domain = String;

/// Type alias for a correlation ID linking a causal chain of events
pub type CorrelationId = String;
