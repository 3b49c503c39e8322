// Persist-then-announce seam for event producers
//
// The publisher is the one write-then-broadcast helper: it persists the
// event, then hands the returned row id to the broadcaster. Producers that
// go through it cannot announce anything that was not durably written first.

use std::sync::Arc;

use lantern_core::{EventId, EventStore, NewEvent, Result};

use crate::broadcaster::EventBroadcaster;

pub struct EventPublisher {
    store: Arc<dyn EventStore>,
    broadcaster: Arc<EventBroadcaster>,
}

impl EventPublisher {
    pub fn new(store: Arc<dyn EventStore>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { store, broadcaster }
    }

    /// Persist the event, then broadcast its persisted id.
    ///
    /// Returns the assigned row id and the number of live connections the
    /// event was enqueued for.
    pub async fn publish(&self, event: NewEvent) -> Result<(EventId, usize)> {
        let id = self.store.persist_event(event).await?;
        let delivered = self.broadcaster.broadcast_by_id(id).await?;
        Ok((id, delivered))
    }
}
