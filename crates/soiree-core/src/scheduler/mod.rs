//! Dependency Scheduler module
//!
//! The scheduler is the decision core that turns input/result changes into
//! directives: which agents must (re)run, which result slots must be
//! invalidated. It is pure over a session snapshot; applying directives
//! (store writes, event publishes, execution) is the runtime's job.
//!
//! State machine per (session, domain):
//! `ABSENT -> SCHEDULED -> RUNNING -> COMPLETED | FAILED`, and
//! `COMPLETED | FAILED -> ABSENT` on invalidation.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;
use crate::types::{AgentState, Domain, Input, Session};

/// Why an agent is being scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleReason {
    /// A new input tagged this domain
    NewInput,
    /// An upstream domain's result was set or cleared
    DependencyChanged,
    /// A contributing input was removed but others still justify the domain
    InputRemoved,
}

impl ScheduleReason {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleReason::NewInput => "new_input",
            ScheduleReason::DependencyChanged => "dependency_changed",
            ScheduleReason::InputRemoved => "input_removed",
        }
    }
}

/// A scheduling directive for the runtime to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Run (or rerun) the domain's agent
    Execute {
        /// Domain to execute
        domain: Domain,
        /// Why it is being scheduled
        reason: ScheduleReason,
    },
    /// Clear the domain's result slot (transition to ABSENT)
    Invalidate {
        /// Domain to invalidate
        domain: Domain,
    },
}

impl Directive {
    /// The domain this directive targets
    pub fn domain(&self) -> &str {
        match self {
            Directive::Execute { domain, .. } => domain,
            Directive::Invalidate { domain } => domain,
        }
    }
}

/// DependencyScheduler - pure directive planning over session snapshots
pub struct DependencyScheduler {
    graph: Arc<DependencyGraph>,
}

impl DependencyScheduler {
    /// Create a new scheduler over a validated dependency graph
    pub fn new(graph: Arc<DependencyGraph>) -> Self {
        Self { graph }
    }

    /// The dependency graph in use
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Plan directives for an input that was just added with the given tags.
    ///
    /// Every tagged domain is scheduled: ABSENT domains for the first time,
    /// COMPLETED/FAILED domains as a rerun (new evidence may change the
    /// result). Directives targeting a RUNNING domain are emitted too; the
    /// runtime coalesces them into a single pending rerun.
    pub fn plan_input_added(&self, session: &Session, tags: &BTreeSet<Domain>) -> Vec<Directive> {
        let ordered = self
            .graph
            .schedule_order(tags.clone(), |up| self.upstream_unmet(session, tags, up));
        ordered
            .into_iter()
            .map(|domain| Directive::Execute {
                domain,
                reason: ScheduleReason::NewInput,
            })
            .collect()
    }

    /// Plan the cascade for a domain whose result was just set (COMPLETED)
    /// or cleared (ABSENT): every downstream domain currently materialized
    /// in the session is rerun if it is still justified, invalidated if not.
    pub fn plan_result_changed(&self, session: &Session, domain: &str) -> Vec<Directive> {
        let materialized = session.materialized_domains();
        let justified = self.justified_domains(session);

        let affected: BTreeSet<Domain> = self
            .graph
            .downstream_of(domain)
            .into_iter()
            .filter(|d| materialized.contains(d))
            .collect();

        self.split_directives(session, affected, &justified, ScheduleReason::DependencyChanged)
    }

    /// Plan directives for a removed input (already flagged removed in the
    /// snapshot). Each domain the input contributed to is either rerun (if
    /// other non-removed inputs still justify it), or invalidated.
    ///
    /// Downstream propagation is not expanded here: each resulting
    /// invalidation triggers its own `plan_result_changed` cascade, so
    /// transitive chains resolve event by event.
    pub fn plan_input_removed(&self, session: &Session, removed: &Input) -> Vec<Directive> {
        let materialized = session.materialized_domains();
        let justified = self.justified_domains(session);

        let affected: BTreeSet<Domain> = removed
            .domains
            .iter()
            .filter(|d| materialized.contains(*d))
            .cloned()
            .collect();

        self.split_directives(session, affected, &justified, ScheduleReason::InputRemoved)
    }

    /// Domains whose existence is currently justified: tagged by a
    /// non-removed input, or reachable via dependency edges from one.
    pub fn justified_domains(&self, session: &Session) -> BTreeSet<Domain> {
        self.graph.closure(&session.tagged_domains())
    }

    fn split_directives(
        &self,
        session: &Session,
        affected: BTreeSet<Domain>,
        justified: &BTreeSet<Domain>,
        reason: ScheduleReason,
    ) -> Vec<Directive> {
        let (keep, clear): (BTreeSet<Domain>, BTreeSet<Domain>) = affected
            .into_iter()
            .partition(|d| justified.contains(d));

        // Invalidations first so stale state is cleared before reruns start.
        let mut directives: Vec<Directive> = clear
            .into_iter()
            .map(|domain| Directive::Invalidate { domain })
            .collect();

        let ordered = self
            .graph
            .schedule_order(keep.clone(), |up| self.upstream_unmet(session, &keep, up));
        directives.extend(ordered.into_iter().map(|domain| Directive::Execute {
            domain,
            reason,
        }));
        directives
    }

    /// An upstream dependency counts as unmet when it is part of the same
    /// batch or materialized in the session, and has not COMPLETED yet.
    fn upstream_unmet(&self, session: &Session, batch: &BTreeSet<Domain>, upstream: &str) -> bool {
        let completed = matches!(
            session.result(upstream).map(|r| &r.state),
            Some(AgentState::Completed)
        );
        let pending = batch.contains(upstream) || session.results.contains_key(upstream);
        pending && !completed
    }
}
