//! Aggregators - reactive derived views over agent results.
//!
//! Both aggregators recompute from a fresh full snapshot of the session's
//! AgentResult map, never by patching the previous aggregate. That trades
//! recomputation cost for strong consistency with the last-known agent
//! states.

use std::sync::Arc;

use soiree_core::store::{SessionStore, StoreError};
use soiree_core::types::{
    AgentState, Budget, BudgetLine, FinalPlan, PlanSection, SectionStatus, Session,
};
use soiree_stores::{Event, EventBus, EventPayload};

/// Payload key domain agents use to expose a cost estimate
const COST_FIELD: &str = "estimated_cost";
/// Payload key domain agents use to expose a one-line summary
const SUMMARY_FIELD: &str = "summary";

/// BudgetAggregator - derives the budget from completed agent results
pub struct BudgetAggregator {
    store: Arc<dyn SessionStore>,
    bus: Arc<dyn EventBus>,
}

impl BudgetAggregator {
    /// Create a new aggregator
    pub fn new(store: Arc<dyn SessionStore>, bus: Arc<dyn EventBus>) -> Self {
        Self { store, bus }
    }

    /// Recompute the budget from the current snapshot and publish
    /// `budget.updated`.
    pub async fn recompute(
        &self,
        session_id: &str,
        correlation_id: &str,
    ) -> Result<Budget, StoreError> {
        let snapshot = self.store.snapshot(session_id).await?;
        let budget = derive_budget(&snapshot);
        self.store.set_budget(session_id, budget.clone()).await?;
        self.bus
            .publish(Event::new(
                session_id,
                correlation_id,
                EventPayload::BudgetUpdated {
                    total: budget.total,
                },
            ))
            .await;
        Ok(budget)
    }
}

fn derive_budget(snapshot: &Session) -> Budget {
    let mut lines: Vec<BudgetLine> = snapshot
        .results
        .values()
        .filter(|r| r.state == AgentState::Completed)
        .filter_map(|r| {
            r.payload
                .get(COST_FIELD)
                .and_then(|v| v.as_f64())
                .map(|amount| BudgetLine {
                    domain: r.domain.clone(),
                    amount,
                    confidence: r.confidence,
                })
        })
        .collect();
    lines.sort_by(|a, b| a.domain.cmp(&b.domain));
    Budget::from_lines(lines)
}

/// FinalPlanAggregator - derives the best-effort final plan.
///
/// A permanently FAILED domain renders as an explicit unavailable section,
/// never a silent omission.
pub struct FinalPlanAggregator {
    store: Arc<dyn SessionStore>,
    bus: Arc<dyn EventBus>,
}

impl FinalPlanAggregator {
    /// Create a new aggregator
    pub fn new(store: Arc<dyn SessionStore>, bus: Arc<dyn EventBus>) -> Self {
        Self { store, bus }
    }

    /// Recompute the final plan from the current snapshot and publish
    /// `plan.updated`.
    pub async fn recompute(
        &self,
        session_id: &str,
        correlation_id: &str,
    ) -> Result<FinalPlan, StoreError> {
        let snapshot = self.store.snapshot(session_id).await?;
        let plan = derive_plan(&snapshot);
        self.store.set_final_plan(session_id, plan.clone()).await?;
        self.bus
            .publish(Event::new(
                session_id,
                correlation_id,
                EventPayload::PlanUpdated {
                    sections: plan.sections.len(),
                    unavailable: plan.unavailable_count(),
                },
            ))
            .await;
        Ok(plan)
    }
}

fn derive_plan(snapshot: &Session) -> FinalPlan {
    let mut sections: Vec<PlanSection> = snapshot
        .results
        .values()
        .map(|r| match &r.state {
            AgentState::Completed => PlanSection {
                domain: r.domain.clone(),
                status: SectionStatus::Ready,
                summary: r
                    .payload
                    .get(SUMMARY_FIELD)
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| r.payload.to_string()),
                payload: r.payload.clone(),
                confidence: r.confidence,
            },
            AgentState::Failed { error, .. } => PlanSection {
                domain: r.domain.clone(),
                status: SectionStatus::Unavailable,
                summary: format!("needs attention: {}", error),
                payload: serde_json::Value::Null,
                confidence: 0.0,
            },
            AgentState::Scheduled | AgentState::Running => PlanSection {
                domain: r.domain.clone(),
                status: SectionStatus::Pending,
                summary: "recommendation in progress".to_string(),
                payload: serde_json::Value::Null,
                confidence: 0.0,
            },
        })
        .collect();
    sections.sort_by(|a, b| a.domain.cmp(&b.domain));

    let ready = sections
        .iter()
        .filter(|s| s.status == SectionStatus::Ready)
        .count();
    let summary = format!("{} of {} sections ready", ready, sections.len());

    FinalPlan {
        sections,
        summary,
        generated_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    use soiree_core::types::AgentResult;
    use soiree_stores::{topic, InMemoryEventBus, InMemorySessionStore};

    fn completed(domain: &str, payload: serde_json::Value, confidence: f64) -> AgentResult {
        let mut result = AgentResult::scheduled(domain, BTreeSet::new());
        result.complete(payload, confidence);
        result
    }

    async fn seeded_store() -> Arc<InMemorySessionStore> {
        let store = Arc::new(InMemorySessionStore::new());
        store.create_session("party-1").await.unwrap();
        store
            .set_agent_result(
                "party-1",
                completed(
                    "venue",
                    json!({"summary": "botanical garden", "estimated_cost": 1200.0}),
                    0.9,
                ),
            )
            .await
            .unwrap();
        store
            .set_agent_result(
                "party-1",
                completed("cake", json!({"summary": "jungle cake", "estimated_cost": 150.0}), 0.8),
            )
            .await
            .unwrap();
        let mut failed = AgentResult::scheduled("catering", BTreeSet::new());
        failed.fail("no caterers reachable", false);
        store.set_agent_result("party-1", failed).await.unwrap();
        store
    }

    #[test]
    fn test_budget_sums_completed_domains_only() {
        tokio_test::block_on(async {
            let store = seeded_store().await;
            let bus = Arc::new(InMemoryEventBus::new());
            let mut updated = bus.subscribe(topic::BUDGET_UPDATED);

            let aggregator = BudgetAggregator::new(store.clone(), bus.clone());
            let budget = aggregator.recompute("party-1", "corr-1").await.unwrap();

            assert_eq!(budget.total, 1350.0);
            assert_eq!(budget.lines.len(), 2);
            assert_eq!(budget.lines[0].domain, "cake");

            let event = updated.recv().await.unwrap();
            assert_eq!(event.topic(), topic::BUDGET_UPDATED);
            assert!(store.budget("party-1").await.unwrap().is_some());
        });
    }

    #[test]
    fn test_failed_domain_renders_unavailable_section() {
        tokio_test::block_on(async {
            let store = seeded_store().await;
            let bus = Arc::new(InMemoryEventBus::new());

            let aggregator = FinalPlanAggregator::new(store.clone(), bus.clone());
            let plan = aggregator.recompute("party-1", "corr-1").await.unwrap();

            assert_eq!(plan.sections.len(), 3);
            let catering = plan
                .sections
                .iter()
                .find(|s| s.domain == "catering")
                .unwrap();
            assert_eq!(catering.status, SectionStatus::Unavailable);
            assert!(catering.summary.contains("needs attention"));
            assert_eq!(plan.summary, "2 of 3 sections ready");
        });
    }

    #[test]
    fn test_recompute_is_fresh_not_incremental() {
        tokio_test::block_on(async {
            let store = seeded_store().await;
            let bus = Arc::new(InMemoryEventBus::new());
            let aggregator = BudgetAggregator::new(store.clone(), bus.clone());

            aggregator.recompute("party-1", "corr-1").await.unwrap();
            // A domain disappears; the next recompute reflects the removal.
            store.remove_agent_result("party-1", "venue").await.unwrap();
            let budget = aggregator.recompute("party-1", "corr-2").await.unwrap();

            assert_eq!(budget.total, 150.0);
            assert_eq!(budget.lines.len(), 1);
        });
    }

    #[test]
    fn test_unknown_session_surfaces_not_found() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemorySessionStore::new());
            let bus = Arc::new(InMemoryEventBus::new());
            let aggregator = BudgetAggregator::new(store, bus);
            assert!(matches!(
                aggregator.recompute("missing", "corr-1").await,
                Err(StoreError::NotFound(_))
            ));
        });
    }
}
