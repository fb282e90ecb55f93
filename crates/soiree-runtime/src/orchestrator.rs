//! Orchestrator - input -> route -> classify -> schedule -> execute pipeline.
//!
//! The orchestrator connects the event bus, the session store, the
//! complexity router, and the dependency scheduler. Input handling runs the
//! scheduling decision inline; cascades and aggregate recomputation react to
//! bus events on spawned loops, so one domain's failure never blocks another
//! domain's slot.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use soiree_core::classifier::InputClassifier;
use soiree_core::router::{ComplexityAssessment, ComplexityRouter};
use soiree_core::scheduler::{DependencyScheduler, Directive};
use soiree_core::store::{SessionStore, StoreError};
use soiree_core::types::{
    AgentResult, CorrelationId, Domain, Input, InputSource, NormalizedPlan, Session,
};
use soiree_stores::{topic, Event, EventBus, EventPayload};

use crate::aggregator::{BudgetAggregator, FinalPlanAggregator};
use crate::runtime::AgentRuntime;

/// Orchestrator errors
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Receipt returned to the caller of `handle_input`
#[derive(Debug)]
pub struct InputReceipt {
    /// The stored input (with its generated ID and tags)
    pub input: Input,
    /// The complexity assessment that picked the path
    pub assessment: ComplexityAssessment,
    /// The normalized plan the chosen path produced
    pub plan: NormalizedPlan,
    /// Correlation ID shared by every event this input caused
    pub correlation_id: CorrelationId,
}

/// Orchestrator - wires bus + store + router + scheduler + runtime
pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    bus: Arc<dyn EventBus>,
    router: Arc<ComplexityRouter>,
    classifier: Arc<dyn InputClassifier>,
    scheduler: DependencyScheduler,
    runtime: Arc<AgentRuntime>,
    budget: BudgetAggregator,
    final_plan: FinalPlanAggregator,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create a new orchestrator
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn SessionStore>,
        bus: Arc<dyn EventBus>,
        router: Arc<ComplexityRouter>,
        classifier: Arc<dyn InputClassifier>,
        scheduler: DependencyScheduler,
        runtime: Arc<AgentRuntime>,
        shutdown: CancellationToken,
    ) -> Self {
        let budget = BudgetAggregator::new(store.clone(), bus.clone());
        let final_plan = FinalPlanAggregator::new(store.clone(), bus.clone());
        Self {
            store,
            bus,
            router,
            classifier,
            scheduler,
            runtime,
            budget,
            final_plan,
            shutdown,
        }
    }

    /// The session store in use
    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    /// The event bus in use
    pub fn bus(&self) -> Arc<dyn EventBus> {
        self.bus.clone()
    }

    /// Request shutdown of the reactor loops and in-flight executions
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Get an existing session or create it (sessions are created on first
    /// input).
    pub async fn ensure_session(&self, session_id: &str) -> Result<Session, OrchestratorError> {
        match self.store.snapshot(session_id).await {
            Ok(session) => Ok(session),
            Err(StoreError::NotFound(_)) => Ok(self.store.create_session(session_id).await?),
            Err(e) => Err(e.into()),
        }
    }

    /// Handle a new user input end-to-end: route it, classify it, store it,
    /// and schedule every affected agent.
    pub async fn handle_input(
        &self,
        session_id: &str,
        content: impl Into<String>,
        source: InputSource,
        image_description: Option<&str>,
        added_by: impl Into<String>,
    ) -> Result<InputReceipt, OrchestratorError> {
        let content = content.into();
        self.ensure_session(session_id).await?;

        let correlation_id = Event::new_correlation();
        let routed = self
            .router
            .route(&content, image_description, &self.shutdown)
            .await;

        // Tags come from the routed plan's inferred categories, backstopped
        // by direct classification (a degraded plan carries no categories).
        let mut tags: BTreeSet<Domain> = routed.plan.categories.clone();
        tags.extend(self.classifier.classify(&content));

        let input = Input::new(content, source, added_by).with_domains(tags.clone());
        let stored = self.store.add_input(session_id, input).await?;
        self.bus
            .publish(Event::new(
                session_id,
                correlation_id.as_str(),
                EventPayload::InputAdded {
                    input_id: stored.id.clone(),
                    domains: stored.domains.clone(),
                },
            ))
            .await;

        let snapshot = self.store.snapshot(session_id).await?;
        let directives = self.scheduler.plan_input_added(&snapshot, &tags);
        tracing::debug!(
            session_id,
            input_id = %stored.id,
            directives = directives.len(),
            "scheduling for added input"
        );
        self.apply_directives(session_id, directives, &correlation_id)
            .await?;

        Ok(InputReceipt {
            input: stored,
            assessment: routed.assessment,
            plan: routed.plan,
            correlation_id,
        })
    }

    /// Handle input removal: soft-delete, then rerun or invalidate every
    /// domain the input contributed to.
    pub async fn handle_remove_input(
        &self,
        session_id: &str,
        input_id: &str,
    ) -> Result<CorrelationId, OrchestratorError> {
        let correlation_id = Event::new_correlation();
        let removed = self.store.remove_input(session_id, input_id).await?;
        self.bus
            .publish(Event::new(
                session_id,
                correlation_id.as_str(),
                EventPayload::InputRemoved {
                    input_id: removed.id.clone(),
                    domains: removed.domains.clone(),
                },
            ))
            .await;

        let snapshot = self.store.snapshot(session_id).await?;
        let directives = self.scheduler.plan_input_removed(&snapshot, &removed);
        tracing::debug!(
            session_id,
            input_id,
            directives = directives.len(),
            "scheduling for removed input"
        );
        self.apply_directives(session_id, directives, &correlation_id)
            .await?;

        Ok(correlation_id)
    }

    /// Apply scheduler directives: write slot transitions and publish the
    /// matching events. Execution itself reacts to `agent.should_execute`.
    async fn apply_directives(
        &self,
        session_id: &str,
        directives: Vec<Directive>,
        correlation_id: &str,
    ) -> Result<(), OrchestratorError> {
        for directive in directives {
            match directive {
                Directive::Execute { domain, reason } => {
                    let snapshot = self.store.snapshot(session_id).await?;
                    let running = snapshot
                        .result(&domain)
                        .map(|r| r.state.is_running())
                        .unwrap_or(false);
                    if !running {
                        // SCHEDULED overwrites COMPLETED/FAILED (rerun) and
                        // materializes ABSENT slots; RUNNING slots are left
                        // for the runtime to coalesce.
                        let slot = AgentResult::scheduled(
                            domain.as_str(),
                            snapshot.inputs_tagging(&domain),
                        );
                        self.store.set_agent_result(session_id, slot).await?;
                    }
                    self.bus
                        .publish(Event::new(
                            session_id,
                            correlation_id,
                            EventPayload::AgentShouldExecute {
                                domain: domain.clone(),
                                reason,
                            },
                        ))
                        .await;
                }
                Directive::Invalidate { domain } => {
                    let removed = self.store.remove_agent_result(session_id, &domain).await?;
                    if removed.is_some() {
                        self.bus
                            .publish(Event::new(
                                session_id,
                                correlation_id,
                                EventPayload::AgentDataRemoved {
                                    domain: domain.clone(),
                                },
                            ))
                            .await;
                    }
                }
            }
        }
        Ok(())
    }

    /// Spawn the reactive loops: agent execution, dependency cascades, and
    /// aggregate recomputation. Each loop runs until shutdown; faults inside
    /// one reaction are logged and isolated.
    pub fn spawn_reactors(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_executor_loop(),
            self.spawn_cascade_loop(),
            self.spawn_aggregator_loop(),
        ]
    }

    fn spawn_executor_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let mut rx = self.bus.subscribe(topic::AGENT_SHOULD_EXECUTE);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                    _ = orchestrator.shutdown.cancelled() => break,
                };
                if let Some(domain) = event.domain() {
                    orchestrator.runtime.clone().handle_should_execute(
                        &event.session_id,
                        domain,
                        &event.correlation_id,
                    );
                }
            }
        })
    }

    fn spawn_cascade_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let mut rx = self
            .bus
            .subscribe_many(&[topic::AGENT_COMPLETED, topic::AGENT_DATA_REMOVED]);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                    _ = orchestrator.shutdown.cancelled() => break,
                };
                if let Err(e) = orchestrator.cascade(&event).await {
                    tracing::warn!(
                        session_id = %event.session_id,
                        error = %e,
                        "cascade reaction failed"
                    );
                }
            }
        })
    }

    fn spawn_aggregator_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let mut rx = self
            .bus
            .subscribe_many(&[topic::AGENT_COMPLETED, topic::AGENT_DATA_REMOVED]);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                    _ = orchestrator.shutdown.cancelled() => break,
                };
                if let Err(e) = orchestrator
                    .budget
                    .recompute(&event.session_id, &event.correlation_id)
                    .await
                {
                    tracing::warn!(session_id = %event.session_id, error = %e, "budget recompute failed");
                }
                if let Err(e) = orchestrator
                    .final_plan
                    .recompute(&event.session_id, &event.correlation_id)
                    .await
                {
                    tracing::warn!(session_id = %event.session_id, error = %e, "plan recompute failed");
                }
            }
        })
    }

    /// Cascade a result change (set or cleared) to downstream domains.
    async fn cascade(&self, event: &Event) -> Result<(), OrchestratorError> {
        let Some(domain) = event.domain() else {
            return Ok(());
        };
        let snapshot = self.store.snapshot(&event.session_id).await?;
        let directives = self.scheduler.plan_result_changed(&snapshot, domain);
        if !directives.is_empty() {
            tracing::debug!(
                session_id = %event.session_id,
                domain,
                directives = directives.len(),
                "cascading result change downstream"
            );
        }
        self.apply_directives(&event.session_id, directives, &event.correlation_id)
            .await
    }
}
