//! AgentRuntime - generic execution wrapper around domain agents.
//!
//! The runtime owns the RUNNING side of the lifecycle: it transitions
//! SCHEDULED -> RUNNING, invokes the domain function under a deadline,
//! persists COMPLETED / FAILED, and publishes the matching events.
//!
//! Exactly one execution per (session, domain) is in flight at any instant:
//! a second `agent.should_execute` arriving while RUNNING is coalesced into
//! a single pending rerun consumed when the current execution finishes.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use soiree_core::store::SessionStore;
use soiree_core::types::{AgentResult, CorrelationId, Domain, Input, InputId, SessionId};
use soiree_stores::{Event, EventBus, EventPayload};

use crate::registry::AgentRegistry;

/// Agent runtime execution policy
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Per-execution deadline
    pub execution_timeout: Duration,
    /// Total attempts for retryable failures (>= 1)
    pub max_retry_attempts: u32,
    /// Base backoff delay, doubled per attempt
    pub retry_base_delay: Duration,
    /// Backoff ceiling
    pub retry_max_delay: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(30),
            max_retry_attempts: 3,
            retry_base_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_secs(5),
        }
    }
}

struct InFlight {
    rerun_pending: bool,
    correlation_id: CorrelationId,
}

/// AgentRuntime - executes scheduled agents with timeout, retry, and
/// per-(session, domain) coalescing.
pub struct AgentRuntime {
    store: Arc<dyn SessionStore>,
    bus: Arc<dyn EventBus>,
    registry: Arc<AgentRegistry>,
    config: RuntimeConfig,
    // Guarded by a sync mutex; never held across an await.
    in_flight: Mutex<HashMap<(SessionId, Domain), InFlight>>,
    shutdown: CancellationToken,
}

impl AgentRuntime {
    /// Create a new runtime
    pub fn new(
        store: Arc<dyn SessionStore>,
        bus: Arc<dyn EventBus>,
        registry: Arc<AgentRegistry>,
        config: RuntimeConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            bus,
            registry,
            config,
            in_flight: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Number of executions currently in flight (pending reruns included)
    pub fn in_flight_count(&self) -> usize {
        self.lock_in_flight().len()
    }

    /// React to an `agent.should_execute` directive.
    ///
    /// If an execution for this (session, domain) is already in flight the
    /// request is coalesced into one pending rerun; otherwise a new
    /// execution task is spawned.
    pub fn handle_should_execute(
        self: Arc<Self>,
        session_id: &str,
        domain: &str,
        correlation_id: &str,
    ) {
        let key = (session_id.to_string(), domain.to_string());
        {
            let mut in_flight = self.lock_in_flight();
            if let Some(entry) = in_flight.get_mut(&key) {
                entry.rerun_pending = true;
                entry.correlation_id = correlation_id.to_string();
                tracing::debug!(
                    session_id,
                    domain,
                    "execution already in flight, coalescing into pending rerun"
                );
                return;
            }
            in_flight.insert(
                key.clone(),
                InFlight {
                    rerun_pending: false,
                    correlation_id: correlation_id.to_string(),
                },
            );
        }

        tokio::spawn(async move {
            self.run_lifecycle(key.0, key.1).await;
        });
    }

    /// Run executions for one (session, domain) until no rerun is pending.
    async fn run_lifecycle(&self, session_id: SessionId, domain: Domain) {
        let key = (session_id.clone(), domain.clone());
        loop {
            let correlation_id = match self.lock_in_flight().get(&key) {
                Some(entry) => entry.correlation_id.clone(),
                None => return,
            };

            self.execute_attempts(&session_id, &domain, &correlation_id)
                .await;

            let mut in_flight = self.lock_in_flight();
            match in_flight.get_mut(&key) {
                Some(entry) if entry.rerun_pending => {
                    entry.rerun_pending = false;
                    tracing::debug!(
                        session_id = %session_id,
                        domain = %domain,
                        "consuming pending rerun"
                    );
                }
                _ => {
                    in_flight.remove(&key);
                    return;
                }
            }
        }
    }

    /// One execution including the retry loop for retryable failures.
    async fn execute_attempts(&self, session_id: &str, domain: &str, correlation_id: &str) {
        let Some(agent) = self.registry.get(domain) else {
            tracing::warn!(session_id, domain, "no agent registered for domain");
            self.persist_failure(
                session_id,
                domain,
                correlation_id,
                BTreeSet::new(),
                "no agent registered for domain",
                false,
            )
            .await;
            return;
        };

        let max_attempts = self.config.max_retry_attempts.max(1);
        for attempt in 1..=max_attempts {
            let snapshot = match self.store.snapshot(session_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(session_id, domain, error = %e, "snapshot failed, aborting execution");
                    return;
                }
            };
            // The slot may have been invalidated between scheduling and now.
            if snapshot.result(domain).is_none() {
                tracing::debug!(session_id, domain, "slot cleared before execution, skipping");
                return;
            }

            let inputs: Vec<Input> = snapshot
                .active_inputs()
                .filter(|i| i.domains.contains(domain))
                .cloned()
                .collect();
            let contributing: BTreeSet<InputId> = inputs.iter().map(|i| i.id.clone()).collect();

            let mut slot = AgentResult::scheduled(domain, contributing.clone());
            slot.start_running();
            if let Err(e) = self.store.set_agent_result(session_id, slot).await {
                tracing::warn!(session_id, domain, error = %e, "failed to mark running");
                return;
            }
            self.publish(
                session_id,
                correlation_id,
                EventPayload::AgentStarted {
                    domain: domain.to_string(),
                    attempt,
                },
            )
            .await;

            let cancel = self.shutdown.child_token();
            let outcome = tokio::time::timeout(
                self.config.execution_timeout,
                agent.run(&snapshot, &inputs, cancel.clone()),
            )
            .await;

            let (error, retryable) = match outcome {
                Ok(Ok((payload, confidence))) => {
                    self.persist_success(session_id, domain, correlation_id, payload, confidence)
                        .await;
                    return;
                }
                Ok(Err(e)) => (e.to_string(), e.is_retryable()),
                Err(_) => {
                    // Deadline expired: signal the agent and abandon the
                    // attempt (best-effort cancellation).
                    cancel.cancel();
                    ("execution deadline exceeded".to_string(), true)
                }
            };

            self.persist_failure(
                session_id,
                domain,
                correlation_id,
                contributing,
                &error,
                retryable,
            )
            .await;

            if retryable && attempt < max_attempts {
                let delay = self.retry_delay(attempt);
                tracing::debug!(
                    session_id,
                    domain,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            return;
        }
    }

    async fn persist_success(
        &self,
        session_id: &str,
        domain: &str,
        correlation_id: &str,
        payload: serde_json::Value,
        confidence: f64,
    ) {
        // Re-check justification on a fresh snapshot: if the slot was
        // invalidated while the agent ran (its inputs were removed), the
        // result is discarded and the slot stays ABSENT.
        let fresh = match self.store.snapshot(session_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(session_id, domain, error = %e, "snapshot failed, discarding result");
                return;
            }
        };
        if fresh.result(domain).is_none() {
            tracing::debug!(
                session_id,
                domain,
                "slot cleared while agent ran, discarding result"
            );
            return;
        }

        let mut done = AgentResult::scheduled(domain, fresh.inputs_tagging(domain));
        done.complete(payload.clone(), confidence);
        let confidence = done.confidence;
        if let Err(e) = self.store.set_agent_result(session_id, done).await {
            tracing::warn!(session_id, domain, error = %e, "failed to persist result");
            return;
        }
        self.publish(
            session_id,
            correlation_id,
            EventPayload::AgentCompleted {
                domain: domain.to_string(),
                result: payload,
                confidence,
            },
        )
        .await;
    }

    async fn persist_failure(
        &self,
        session_id: &str,
        domain: &str,
        correlation_id: &str,
        contributing: BTreeSet<InputId>,
        error: &str,
        retryable: bool,
    ) {
        // Same justification re-check as the success path: a slot cleared
        // while the agent ran must stay ABSENT, not resurface as FAILED.
        match self.store.snapshot(session_id).await {
            Ok(fresh) if fresh.result(domain).is_none() => {
                tracing::debug!(
                    session_id,
                    domain,
                    "slot cleared while agent ran, discarding failure"
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(session_id, domain, error = %e, "snapshot failed, discarding failure");
                return;
            }
        }

        let mut failed = AgentResult::scheduled(domain, contributing);
        failed.fail(error, retryable);
        if let Err(e) = self.store.set_agent_result(session_id, failed).await {
            tracing::warn!(session_id, domain, error = %e, "failed to persist failure");
        }
        self.publish(
            session_id,
            correlation_id,
            EventPayload::AgentFailed {
                domain: domain.to_string(),
                error: error.to_string(),
                retryable,
            },
        )
        .await;
    }

    async fn publish(&self, session_id: &str, correlation_id: &str, payload: EventPayload) {
        self.bus
            .publish(Event::new(session_id, correlation_id, payload))
            .await;
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.config.retry_base_delay.saturating_mul(factor);
        delay.min(self.config.retry_max_delay)
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<(SessionId, Domain), InFlight>> {
        // Poisoning can only come from a panic inside the runtime's own
        // short critical sections.
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;

    use soiree_core::types::Session;
    use soiree_stores::{topic, InMemoryEventBus, InMemorySessionStore};

    use crate::registry::{AgentError, DomainAgent};

    struct CountingAgent {
        domain: &'static str,
        runs: Arc<AtomicU32>,
        delay: Duration,
        fail_first: u32,
    }

    #[async_trait]
    impl DomainAgent for CountingAgent {
        fn domain(&self) -> &str {
            self.domain
        }

        fn description(&self) -> &str {
            "counting stub"
        }

        async fn run(
            &self,
            _snapshot: &Session,
            inputs: &[Input],
            _cancel: CancellationToken,
        ) -> Result<(Value, f64), AgentError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if run <= self.fail_first {
                return Err(AgentError::Retryable(format!("transient failure {}", run)));
            }
            Ok((json!({"inputs": inputs.len()}), 0.9))
        }
    }

    struct Harness {
        store: Arc<InMemorySessionStore>,
        bus: Arc<InMemoryEventBus>,
        runtime: Arc<AgentRuntime>,
        runs: Arc<AtomicU32>,
    }

    fn harness(config: RuntimeConfig, delay: Duration, fail_first: u32) -> Harness {
        let store = Arc::new(InMemorySessionStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let runs = Arc::new(AtomicU32::new(0));
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(CountingAgent {
            domain: "venue",
            runs: runs.clone(),
            delay,
            fail_first,
        }));
        let runtime = Arc::new(AgentRuntime::new(
            store.clone(),
            bus.clone(),
            Arc::new(registry),
            config,
            CancellationToken::new(),
        ));
        Harness {
            store,
            bus,
            runtime,
            runs,
        }
    }

    async fn seed_scheduled(store: &InMemorySessionStore, session_id: &str, domain: &str) {
        store.create_session(session_id).await.unwrap();
        store
            .add_input(
                session_id,
                Input::text("venue by the lake", "user")
                    .with_domains(BTreeSet::from([domain.to_string()])),
            )
            .await
            .unwrap();
        let snapshot = store.snapshot(session_id).await.unwrap();
        store
            .set_agent_result(
                session_id,
                AgentResult::scheduled(domain, snapshot.inputs_tagging(domain)),
            )
            .await
            .unwrap();
    }

    async fn wait_for(mut rx: mpsc::Receiver<Event>, topic_name: &str) -> Event {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("bus closed");
            if event.topic() == topic_name {
                return event;
            }
        }
    }

    #[test]
    fn test_successful_execution_completes_and_publishes() {
        tokio_test::block_on(async {
            let h = harness(RuntimeConfig::default(), Duration::ZERO, 0);
            seed_scheduled(&h.store, "party-1", "venue").await;
            let completed = h.bus.subscribe(topic::AGENT_COMPLETED);

            h.runtime
                .clone()
                .handle_should_execute("party-1", "venue", "corr-1");

            let event = wait_for(completed, topic::AGENT_COMPLETED).await;
            assert_eq!(event.correlation_id, "corr-1");
            assert_eq!(event.domain(), Some("venue"));

            let result = h
                .store
                .agent_result("party-1", "venue")
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(result.state, soiree_core::types::AgentState::Completed));
            assert_eq!(h.runs.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_duplicate_should_execute_coalesces_to_one_rerun() {
        tokio_test::block_on(async {
            let h = harness(
                RuntimeConfig::default(),
                Duration::from_millis(100),
                0,
            );
            seed_scheduled(&h.store, "party-1", "venue").await;
            let mut completed = h.bus.subscribe(topic::AGENT_COMPLETED);

            h.runtime
                .clone()
                .handle_should_execute("party-1", "venue", "corr-1");
            // Two duplicates while the first execution is still running.
            h.runtime
                .clone()
                .handle_should_execute("party-1", "venue", "corr-2");
            h.runtime
                .clone()
                .handle_should_execute("party-1", "venue", "corr-3");
            assert_eq!(h.runtime.in_flight_count(), 1);

            // First completion, then exactly one coalesced rerun.
            let first = wait_for_next(&mut completed).await;
            assert_eq!(first.correlation_id, "corr-1");
            let second = wait_for_next(&mut completed).await;
            assert_eq!(second.correlation_id, "corr-3");

            tokio::time::sleep(Duration::from_millis(200)).await;
            assert_eq!(h.runs.load(Ordering::SeqCst), 2);
            assert_eq!(h.runtime.in_flight_count(), 0);
        });
    }

    async fn wait_for_next(rx: &mut mpsc::Receiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("bus closed")
    }

    #[test]
    fn test_retryable_failure_retries_with_backoff_then_succeeds() {
        tokio_test::block_on(async {
            let config = RuntimeConfig {
                retry_base_delay: Duration::from_millis(10),
                retry_max_delay: Duration::from_millis(50),
                ..RuntimeConfig::default()
            };
            let h = harness(config, Duration::ZERO, 2);
            seed_scheduled(&h.store, "party-1", "venue").await;
            let completed = h.bus.subscribe(topic::AGENT_COMPLETED);
            let mut failed = h.bus.subscribe(topic::AGENT_FAILED);

            h.runtime
                .clone()
                .handle_should_execute("party-1", "venue", "corr-1");

            wait_for(completed, topic::AGENT_COMPLETED).await;
            assert_eq!(h.runs.load(Ordering::SeqCst), 3);
            // Two intermediate failures were surfaced on the bus.
            assert!(wait_for_next(&mut failed).await.topic() == topic::AGENT_FAILED);
            assert!(wait_for_next(&mut failed).await.topic() == topic::AGENT_FAILED);
        });
    }

    #[test]
    fn test_retries_exhausted_leaves_failed_slot() {
        tokio_test::block_on(async {
            let config = RuntimeConfig {
                max_retry_attempts: 2,
                retry_base_delay: Duration::from_millis(5),
                ..RuntimeConfig::default()
            };
            let h = harness(config, Duration::ZERO, 10);
            seed_scheduled(&h.store, "party-1", "venue").await;
            let mut failed = h.bus.subscribe(topic::AGENT_FAILED);

            h.runtime
                .clone()
                .handle_should_execute("party-1", "venue", "corr-1");

            wait_for_next(&mut failed).await;
            wait_for_next(&mut failed).await;
            tokio::time::sleep(Duration::from_millis(50)).await;

            let result = h
                .store
                .agent_result("party-1", "venue")
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(
                result.state,
                soiree_core::types::AgentState::Failed { retryable: true, .. }
            ));
            assert_eq!(h.runs.load(Ordering::SeqCst), 2);
        });
    }

    #[test]
    fn test_timeout_marks_failed_retryable() {
        tokio_test::block_on(async {
            let config = RuntimeConfig {
                execution_timeout: Duration::from_millis(20),
                max_retry_attempts: 1,
                ..RuntimeConfig::default()
            };
            let h = harness(config, Duration::from_secs(3600), 0);
            seed_scheduled(&h.store, "party-1", "venue").await;
            let mut failed = h.bus.subscribe(topic::AGENT_FAILED);

            h.runtime
                .clone()
                .handle_should_execute("party-1", "venue", "corr-1");

            let event = wait_for_next(&mut failed).await;
            match &event.payload {
                EventPayload::AgentFailed { error, retryable, .. } => {
                    assert!(error.contains("deadline"));
                    assert!(retryable);
                }
                other => panic!("expected agent_failed payload, got {:?}", other),
            }
        });
    }

    #[test]
    fn test_result_discarded_when_slot_cleared_mid_run() {
        tokio_test::block_on(async {
            let h = harness(
                RuntimeConfig::default(),
                Duration::from_millis(100),
                0,
            );
            seed_scheduled(&h.store, "party-1", "venue").await;
            let mut started = h.bus.subscribe(topic::AGENT_STARTED);

            h.runtime
                .clone()
                .handle_should_execute("party-1", "venue", "corr-1");
            wait_for_next(&mut started).await;

            // Invalidate the slot while the agent is still running.
            h.store
                .remove_agent_result("party-1", "venue")
                .await
                .unwrap();

            tokio::time::sleep(Duration::from_millis(300)).await;
            assert!(h
                .store
                .agent_result("party-1", "venue")
                .await
                .unwrap()
                .is_none());
            assert_eq!(h.runtime.in_flight_count(), 0);
        });
    }
}
