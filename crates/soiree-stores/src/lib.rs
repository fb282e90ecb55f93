//! # Soiree Stores
//!
//! In-memory implementations of the Soiree storage and fan-out abstractions:
//! - Event / EventBus: topic-addressed publish/subscribe with bounded
//!   per-subscriber buffers and a bounded debug history
//! - InMemorySessionStore: per-session locked state container
//!
//! Durability beyond the process lifetime is explicitly out of scope; a
//! durable store is an external collaborator satisfying the same traits.

mod event_bus;
mod session_store;

pub use event_bus::{topic, Event, EventBus, EventId, EventPayload, InMemoryEventBus};
pub use session_store::InMemorySessionStore;
