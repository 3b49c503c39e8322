// Event Delivery Abstractions
//
// This crate provides the store-agnostic building blocks of the Lantern
// event-delivery engine.
//
// Key design decisions:
// - Events are immutable once persisted; the store assigns every sequence number
// - Consumers (broadcaster, replay) receive an EventStore trait, never a pool
// - Delivery paths accept EventId only, so nothing unpersisted can be announced
// - Error handling distinguishes contract violations from recoverable failures

pub mod error;
pub mod event;
pub mod store;

// Re-exports for convenience
pub use error::{EngineError, Result};
pub use event::{Event, EventId, NewEvent};
pub use store::EventStore;
