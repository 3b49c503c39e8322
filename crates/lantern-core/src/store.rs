// EventStore trait - the contract between the delivery engine and persistence
//
// The broadcaster and replay buffer only ever call the read methods; the
// write path exists for producers (and returns the EventId they must hand
// to the broadcaster, making persist-before-send the only possible order).

use async_trait::async_trait;

use crate::error::Result;
use crate::event::{Event, EventId, NewEvent};

/// Durable, sequence-ordered event log.
///
/// Implementations must assign sequence numbers atomically at write time:
/// strictly increasing, never reused, never reordered.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist an event and assign its global sequence number.
    ///
    /// Returns the row id that producers pass to the broadcaster.
    async fn persist_event(&self, event: NewEvent) -> Result<EventId>;

    /// Fetch a persisted event by row id. None means the id was never written.
    async fn event_by_id(&self, id: EventId) -> Result<Option<Event>>;

    /// Fetch up to `limit` events with sequence strictly greater than
    /// `after_sequence`, ordered by sequence, optionally filtered by job id.
    async fn events_since(
        &self,
        after_sequence: i64,
        job_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Event>>;

    /// Current highest assigned sequence number (0 for an empty store).
    async fn current_sequence(&self) -> Result<i64>;
}
