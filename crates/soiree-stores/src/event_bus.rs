//! EventBus - topic-addressed realtime event fan-out.
//!
//! Every subscriber owns an independently buffered channel: a slow or
//! stalled subscriber never blocks publishers, a full buffer drops the
//! event for that subscriber only (logged, not retried), and a panic in
//! one subscriber task cannot reach the publisher or its siblings because
//! the bus never invokes subscriber code.
//!
//! A bounded ring of recent events is retained for debugging; history is
//! best-effort, not source of truth.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use soiree_core::scheduler::ScheduleReason;
use soiree_core::types::{CorrelationId, Domain, InputId, SessionId};

/// Type alias for Event ID
pub type EventId = String;

/// Well-known topic names
pub mod topic {
    pub const INPUT_ADDED: &str = "input.added";
    pub const INPUT_REMOVED: &str = "input.removed";
    pub const AGENT_SHOULD_EXECUTE: &str = "agent.should_execute";
    pub const AGENT_STARTED: &str = "agent.started";
    pub const AGENT_COMPLETED: &str = "agent.completed";
    pub const AGENT_FAILED: &str = "agent.failed";
    pub const AGENT_DATA_REMOVED: &str = "agent.data_removed";
    pub const BUDGET_UPDATED: &str = "budget.updated";
    pub const PLAN_UPDATED: &str = "plan.updated";
}

/// Typed event payload; the tag doubles as the topic name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// An input was appended to a session
    InputAdded {
        /// Input that was added
        input_id: InputId,
        /// Domains the input was tagged with
        domains: BTreeSet<Domain>,
    },
    /// An input was soft-deleted
    InputRemoved {
        /// Input that was removed
        input_id: InputId,
        /// Domains the input had been tagged with
        domains: BTreeSet<Domain>,
    },
    /// A domain agent should (re)run
    AgentShouldExecute {
        /// Target domain
        domain: Domain,
        /// Why it was scheduled
        reason: ScheduleReason,
    },
    /// A domain agent execution started
    AgentStarted {
        /// Target domain
        domain: Domain,
        /// Attempt number (1-based; increments on retry)
        attempt: u32,
    },
    /// A domain agent completed successfully
    AgentCompleted {
        /// Target domain
        domain: Domain,
        /// Result payload
        result: Value,
        /// Agent confidence (0.0 - 1.0)
        confidence: f64,
    },
    /// A domain agent failed
    AgentFailed {
        /// Target domain
        domain: Domain,
        /// Failure reason
        error: String,
        /// Whether the failure is worth retrying
        retryable: bool,
    },
    /// A domain's result slot was cleared
    AgentDataRemoved {
        /// Cleared domain
        domain: Domain,
    },
    /// The budget aggregate was recomputed
    BudgetUpdated {
        /// New total estimate
        total: f64,
    },
    /// The final plan aggregate was recomputed
    PlanUpdated {
        /// Number of sections in the plan
        sections: usize,
        /// Sections marked unavailable
        unavailable: usize,
    },
}

impl EventPayload {
    /// Topic this payload belongs to
    pub fn topic(&self) -> &'static str {
        match self {
            EventPayload::InputAdded { .. } => topic::INPUT_ADDED,
            EventPayload::InputRemoved { .. } => topic::INPUT_REMOVED,
            EventPayload::AgentShouldExecute { .. } => topic::AGENT_SHOULD_EXECUTE,
            EventPayload::AgentStarted { .. } => topic::AGENT_STARTED,
            EventPayload::AgentCompleted { .. } => topic::AGENT_COMPLETED,
            EventPayload::AgentFailed { .. } => topic::AGENT_FAILED,
            EventPayload::AgentDataRemoved { .. } => topic::AGENT_DATA_REMOVED,
            EventPayload::BudgetUpdated { .. } => topic::BUDGET_UPDATED,
            EventPayload::PlanUpdated { .. } => topic::PLAN_UPDATED,
        }
    }
}

/// Event - immutable envelope published on the bus.
///
/// Events caused by the same trigger share a correlation ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: EventId,
    /// Session this event belongs to
    pub session_id: SessionId,
    /// Correlation ID linking a causal chain
    pub correlation_id: CorrelationId,
    /// Publish timestamp
    pub timestamp: DateTime<Utc>,
    /// Typed payload
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event envelope
    pub fn new(
        session_id: impl Into<SessionId>,
        correlation_id: impl Into<CorrelationId>,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            correlation_id: correlation_id.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Start a fresh correlation chain
    pub fn new_correlation() -> CorrelationId {
        uuid::Uuid::new_v4().to_string()
    }

    /// Topic of this event
    pub fn topic(&self) -> &'static str {
        self.payload.topic()
    }

    /// Domain the payload targets, if any
    pub fn domain(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::AgentShouldExecute { domain, .. }
            | EventPayload::AgentStarted { domain, .. }
            | EventPayload::AgentCompleted { domain, .. }
            | EventPayload::AgentFailed { domain, .. }
            | EventPayload::AgentDataRemoved { domain } => Some(domain),
            _ => None,
        }
    }
}

/// EventBus trait - topic-addressed publish/subscribe with fan-out.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to all subscribers of its topic.
    /// Never errors for well-formed payloads; returns the event ID.
    async fn publish(&self, event: Event) -> EventId;

    /// Subscribe to one or more topics on a single channel. Every
    /// subscriber receives every event for its topics (fan-out, not
    /// competing consumers).
    fn subscribe_many(&self, topics: &[&str]) -> mpsc::Receiver<Event>;

    /// Subscribe to a single topic.
    fn subscribe(&self, topic: &str) -> mpsc::Receiver<Event> {
        self.subscribe_many(&[topic])
    }

    /// Recent events for a session, oldest first. Best-effort debug view.
    async fn history(&self, session_id: &str, limit: usize) -> Vec<Event>;
}

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;
const DEFAULT_HISTORY_LIMIT: usize = 1_000;

struct BusInner {
    subscribers: HashMap<String, Vec<mpsc::Sender<Event>>>,
    history: VecDeque<Event>,
}

/// In-process EventBus with per-subscriber bounded buffers.
pub struct InMemoryEventBus {
    // Single lock so per-topic delivery order matches publish order.
    // Nothing inside the critical section blocks (try_send only).
    inner: Mutex<BusInner>,
    subscriber_capacity: usize,
    history_limit: usize,
}

impl InMemoryEventBus {
    /// Create a bus with default capacities
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY, DEFAULT_HISTORY_LIMIT)
    }

    /// Create a bus with explicit per-subscriber buffer and history bounds
    pub fn with_capacity(subscriber_capacity: usize, history_limit: usize) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                subscribers: HashMap::new(),
                history: VecDeque::new(),
            }),
            subscriber_capacity: subscriber_capacity.max(1),
            history_limit: history_limit.max(1),
        }
    }

    /// Configured per-subscriber buffer capacity
    pub fn subscriber_capacity(&self) -> usize {
        self.subscriber_capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        // Subscriber code never runs under this lock, so poisoning can only
        // come from a bug inside the bus itself.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: Event) -> EventId {
        let event_id = event.id.clone();
        let mut inner = self.lock();

        if inner.history.len() >= self.history_limit {
            inner.history.pop_front();
        }
        inner.history.push_back(event.clone());

        if let Some(senders) = inner.subscribers.get_mut(event.topic()) {
            senders.retain(|sender| match sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(dropped)) => {
                    tracing::warn!(
                        topic = dropped.topic(),
                        event_id = %dropped.id,
                        session_id = %dropped.session_id,
                        "subscriber buffer full, dropping event for this subscriber"
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }

        event_id
    }

    fn subscribe_many(&self, topics: &[&str]) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(self.subscriber_capacity);
        let mut inner = self.lock();
        for topic in topics {
            inner
                .subscribers
                .entry((*topic).to_string())
                .or_default()
                .push(tx.clone());
        }
        rx
    }

    async fn history(&self, session_id: &str, limit: usize) -> Vec<Event> {
        let inner = self.lock();
        let mut events: Vec<Event> = inner
            .history
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        if limit > 0 && events.len() > limit {
            let excess = events.len() - limit;
            events.drain(..excess);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input_added(session_id: &str) -> Event {
        Event::new(
            session_id,
            Event::new_correlation(),
            EventPayload::InputAdded {
                input_id: "in-1".to_string(),
                domains: BTreeSet::from(["theme".to_string()]),
            },
        )
    }

    #[test]
    fn test_fan_out_delivers_to_every_subscriber() {
        tokio_test::block_on(async {
            let bus = InMemoryEventBus::new();
            let mut first = bus.subscribe(topic::INPUT_ADDED);
            let mut second = bus.subscribe(topic::INPUT_ADDED);

            bus.publish(input_added("party-1")).await;

            assert_eq!(first.recv().await.unwrap().topic(), topic::INPUT_ADDED);
            assert_eq!(second.recv().await.unwrap().topic(), topic::INPUT_ADDED);
        });
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        tokio_test::block_on(async {
            let bus = InMemoryEventBus::new();
            let id = bus.publish(input_added("party-1")).await;
            assert!(!id.is_empty());
        });
    }

    #[test]
    fn test_full_subscriber_drops_without_blocking_publisher() {
        tokio_test::block_on(async {
            let bus = InMemoryEventBus::with_capacity(1, 100);
            let mut stalled = bus.subscribe(topic::INPUT_ADDED);
            let mut healthy = bus.subscribe(topic::INPUT_ADDED);

            // Second publish overflows the stalled subscriber's buffer of 1.
            bus.publish(input_added("party-1")).await;
            bus.publish(input_added("party-1")).await;

            assert!(stalled.recv().await.is_some());
            assert!(stalled.try_recv().is_err());

            // The healthy subscriber still got only what fits its own buffer,
            // and the publisher never blocked.
            assert!(healthy.recv().await.is_some());
        });
    }

    #[test]
    fn test_subscribers_only_see_their_topics() {
        tokio_test::block_on(async {
            let bus = InMemoryEventBus::new();
            let mut completed_only = bus.subscribe(topic::AGENT_COMPLETED);

            bus.publish(input_added("party-1")).await;
            bus.publish(Event::new(
                "party-1",
                Event::new_correlation(),
                EventPayload::AgentCompleted {
                    domain: "theme".to_string(),
                    result: json!({"palette": "green"}),
                    confidence: 0.9,
                },
            ))
            .await;

            let event = completed_only.recv().await.unwrap();
            assert_eq!(event.topic(), topic::AGENT_COMPLETED);
            assert!(completed_only.try_recv().is_err());
        });
    }

    #[test]
    fn test_per_topic_delivery_preserves_publish_order() {
        tokio_test::block_on(async {
            let bus = InMemoryEventBus::new();
            let mut sub = bus.subscribe(topic::INPUT_ADDED);

            let first = bus.publish(input_added("party-1")).await;
            let second = bus.publish(input_added("party-1")).await;

            assert_eq!(sub.recv().await.unwrap().id, first);
            assert_eq!(sub.recv().await.unwrap().id, second);
        });
    }

    #[test]
    fn test_history_is_bounded_and_per_session() {
        tokio_test::block_on(async {
            let bus = InMemoryEventBus::with_capacity(16, 3);
            for _ in 0..5 {
                bus.publish(input_added("party-1")).await;
            }
            bus.publish(input_added("party-2")).await;

            // Ring keeps only the 3 most recent events overall.
            let first = bus.history("party-1", 0).await;
            assert_eq!(first.len(), 2);
            let second = bus.history("party-2", 0).await;
            assert_eq!(second.len(), 1);

            let limited = bus.history("party-1", 1).await;
            assert_eq!(limited.len(), 1);
        });
    }

    #[test]
    fn test_subscribe_many_merges_topics_on_one_channel() {
        tokio_test::block_on(async {
            let bus = InMemoryEventBus::new();
            let mut sub = bus.subscribe_many(&[topic::INPUT_ADDED, topic::AGENT_DATA_REMOVED]);

            bus.publish(input_added("party-1")).await;
            bus.publish(Event::new(
                "party-1",
                Event::new_correlation(),
                EventPayload::AgentDataRemoved {
                    domain: "venue".to_string(),
                },
            ))
            .await;

            assert_eq!(sub.recv().await.unwrap().topic(), topic::INPUT_ADDED);
            assert_eq!(sub.recv().await.unwrap().topic(), topic::AGENT_DATA_REMOVED);
        });
    }
}
