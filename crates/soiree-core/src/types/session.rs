//! Session type definitions
//!
//! Session is the stateful planning context for one conversation. Every
//! mutating method bumps the version counter so callers can detect staleness
//! across await points.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentResult, Budget, Domain, FinalPlan, Input, InputId};

/// Type alias for Session ID
pub type SessionId = String;

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Actively collecting inputs and recommendations
    Planning,
    /// Revisiting a previously planned session
    Editing,
    /// Planning concluded
    Completed,
}

/// Session - one planning conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,
    /// Current status
    pub status: SessionStatus,
    /// Ordered list of inputs (soft-deleted inputs stay in place)
    #[serde(default)]
    pub inputs: Vec<Input>,
    /// Agent result slot per domain; absence means ABSENT
    #[serde(default)]
    pub results: HashMap<Domain, AgentResult>,
    /// Derived budget aggregate
    #[serde(default)]
    pub budget: Option<Budget>,
    /// Derived final plan aggregate
    #[serde(default)]
    pub final_plan: Option<FinalPlan>,
    /// Monotonic version counter, bumped by every mutation
    #[serde(default)]
    pub version: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session
    pub fn new(id: impl Into<SessionId>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: SessionStatus::Planning,
            inputs: Vec::new(),
            results: HashMap::new(),
            budget: None,
            final_plan: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump version and update timestamp; called by every mutator
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Append an input
    pub fn add_input(&mut self, input: Input) {
        self.inputs.push(input);
        self.touch();
    }

    /// Soft-delete an input. Returns the input snapshot, or None if unknown.
    pub fn remove_input(&mut self, input_id: &str) -> Option<Input> {
        let input = self.inputs.iter_mut().find(|i| i.id == input_id)?;
        input.removed = true;
        let snapshot = input.clone();
        self.touch();
        Some(snapshot)
    }

    /// Look up an input by ID
    pub fn input(&self, input_id: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.id == input_id)
    }

    /// Iterate non-removed inputs
    pub fn active_inputs(&self) -> impl Iterator<Item = &Input> {
        self.inputs.iter().filter(|i| !i.removed)
    }

    /// IDs of non-removed inputs currently tagging the given domain
    pub fn inputs_tagging(&self, domain: &str) -> BTreeSet<InputId> {
        self.active_inputs()
            .filter(|i| i.domains.contains(domain))
            .map(|i| i.id.clone())
            .collect()
    }

    /// Union of domains tagged by non-removed inputs
    pub fn tagged_domains(&self) -> BTreeSet<Domain> {
        self.active_inputs()
            .flat_map(|i| i.domains.iter().cloned())
            .collect()
    }

    /// Domains that currently have a result slot (any state)
    pub fn materialized_domains(&self) -> BTreeSet<Domain> {
        self.results.keys().cloned().collect()
    }

    /// Set (or replace) a domain's result slot
    pub fn set_result(&mut self, result: AgentResult) {
        self.results.insert(result.domain.clone(), result);
        self.touch();
    }

    /// Clear a domain's result slot (transition to ABSENT)
    pub fn clear_result(&mut self, domain: &str) -> Option<AgentResult> {
        let removed = self.results.remove(domain);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Look up a domain's result slot
    pub fn result(&self, domain: &str) -> Option<&AgentResult> {
        self.results.get(domain)
    }

    /// Set the derived budget
    pub fn set_budget(&mut self, budget: Budget) {
        self.budget = Some(budget);
        self.touch();
    }

    /// Set the derived final plan
    pub fn set_final_plan(&mut self, plan: FinalPlan) {
        self.final_plan = Some(plan);
        self.touch();
    }

    /// Update the session status
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InputSource;

    #[test]
    fn test_every_mutation_bumps_version() {
        let mut session = Session::new("party-1");
        assert_eq!(session.version, 0);

        session.add_input(Input::new("50 guests", InputSource::Text, "user"));
        assert_eq!(session.version, 1);

        let input_id = session.inputs[0].id.clone();
        session.remove_input(&input_id).unwrap();
        assert_eq!(session.version, 2);

        session.set_status(SessionStatus::Editing);
        assert_eq!(session.version, 3);
    }

    #[test]
    fn test_remove_input_is_soft() {
        let mut session = Session::new("party-1");
        session.add_input(
            Input::text("jungle theme", "user")
                .with_domains(BTreeSet::from(["theme".to_string()])),
        );
        let input_id = session.inputs[0].id.clone();

        let removed = session.remove_input(&input_id).unwrap();
        assert!(removed.removed);
        // Still present in the ordered list, just flagged.
        assert_eq!(session.inputs.len(), 1);
        assert!(session.inputs_tagging("theme").is_empty());
    }

    #[test]
    fn test_inputs_tagging_ignores_removed() {
        let mut session = Session::new("party-1");
        session.add_input(
            Input::text("venue by the lake", "user")
                .with_domains(BTreeSet::from(["venue".to_string()])),
        );
        session.add_input(
            Input::text("barn venue", "user")
                .with_domains(BTreeSet::from(["venue".to_string()])),
        );
        let first = session.inputs[0].id.clone();
        session.remove_input(&first).unwrap();

        let tagging = session.inputs_tagging("venue");
        assert_eq!(tagging.len(), 1);
        assert!(!tagging.contains(&first));
    }

    #[test]
    fn test_clear_result_on_missing_domain_is_noop() {
        let mut session = Session::new("party-1");
        let version = session.version;
        assert!(session.clear_result("venue").is_none());
        assert_eq!(session.version, version);
    }
}
