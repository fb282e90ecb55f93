//! Normalized plan and derived aggregate types
//!
//! NormalizedPlan is the common output contract of both routing paths.
//! Budget and FinalPlan are derived views recomputed by the aggregators.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Domain;

/// NormalizedPlan - output contract shared by the fast extractor and the
/// slow planner: a normalized set of fields plus a free-text summary plus
/// a confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPlan {
    /// Extracted fields (event_type, guest_count, date, location, ...)
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Free-text summary of what was understood
    #[serde(default)]
    pub summary: String,
    /// Confidence score (0.0 - 1.0)
    #[serde(default)]
    pub confidence: f64,
    /// Inferred planning categories
    #[serde(default)]
    pub categories: BTreeSet<Domain>,
    /// Set when the chosen path failed and this plan is a degraded stand-in
    #[serde(default)]
    pub path_failed: bool,
}

impl NormalizedPlan {
    /// An empty plan (the valid result for empty/whitespace input)
    pub fn empty() -> Self {
        Self {
            fields: BTreeMap::new(),
            summary: String::new(),
            confidence: 0.0,
            categories: BTreeSet::new(),
            path_failed: false,
        }
    }

    /// A degraded plan returned when the slow path timed out or errored.
    /// Confidence is pinned to 0 and the failure is marked explicitly.
    pub fn degraded(summary: impl Into<String>) -> Self {
        Self {
            fields: BTreeMap::new(),
            summary: summary.into(),
            confidence: 0.0,
            categories: BTreeSet::new(),
            path_failed: true,
        }
    }

    /// Set a field value
    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Check whether anything was extracted at all
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.categories.is_empty() && self.summary.is_empty()
    }
}

impl Default for NormalizedPlan {
    fn default() -> Self {
        Self::empty()
    }
}

/// One budget line contributed by a domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLine {
    /// Domain the estimate came from
    pub domain: Domain,
    /// Estimated amount
    pub amount: f64,
    /// Confidence of the contributing agent
    pub confidence: f64,
}

/// Budget - derived aggregate over all completed agent results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Sum of all line estimates
    pub total: f64,
    /// Per-domain line items
    pub lines: Vec<BudgetLine>,
    /// When this aggregate was recomputed
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    /// Build a budget from line items
    pub fn from_lines(lines: Vec<BudgetLine>) -> Self {
        let total = lines.iter().map(|l| l.amount).sum();
        Self {
            total,
            lines,
            updated_at: Utc::now(),
        }
    }
}

/// Render status of one final-plan section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// The domain agent completed and its result is included
    Ready,
    /// The domain agent is still scheduled or running
    Pending,
    /// The domain agent failed permanently; surfaced, never omitted
    Unavailable,
}

/// One section of the final plan, owned by a domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSection {
    /// Owning domain
    pub domain: Domain,
    /// Render status
    pub status: SectionStatus,
    /// Human-readable summary (or the failure reason for unavailable sections)
    pub summary: String,
    /// Domain payload (opaque)
    #[serde(default)]
    pub payload: Value,
    /// Confidence of the contributing agent
    #[serde(default)]
    pub confidence: f64,
}

/// FinalPlan - derived best-effort view over all agent results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalPlan {
    /// Per-domain sections, stable domain order
    pub sections: Vec<PlanSection>,
    /// Overall summary line
    pub summary: String,
    /// When this aggregate was recomputed
    pub generated_at: DateTime<Utc>,
}

impl FinalPlan {
    /// Count sections that need attention
    pub fn unavailable_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| s.status == SectionStatus::Unavailable)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_degraded_plan_has_zero_confidence_and_marker() {
        let plan = NormalizedPlan::degraded("slow path timed out");
        assert!(plan.path_failed);
        assert_eq!(plan.confidence, 0.0);
        assert!(plan.fields.is_empty());
    }

    #[test]
    fn test_budget_totals_line_items() {
        let budget = Budget::from_lines(vec![
            BudgetLine {
                domain: "venue".to_string(),
                amount: 1200.0,
                confidence: 0.9,
            },
            BudgetLine {
                domain: "cake".to_string(),
                amount: 150.0,
                confidence: 0.7,
            },
        ]);
        assert_eq!(budget.total, 1350.0);
        assert_eq!(budget.lines.len(), 2);
    }

    #[test]
    fn test_plan_serialization_round_trip() {
        let mut plan = NormalizedPlan::empty();
        plan.set_field("event_type", json!("birthday"));
        plan.categories.insert("theme".to_string());
        plan.summary = "birthday with jungle theme".to_string();
        plan.confidence = 0.85;

        let text = serde_json::to_string(&plan).unwrap();
        let back: NormalizedPlan = serde_json::from_str(&text).unwrap();
        assert_eq!(back, plan);
    }
}
