// In-memory event log for dev mode
// Decision: Use parking_lot for thread-safe access
//
// Provides the same semantics as the SQLite store backed by a Vec, allowing
// the engine to run without a database for development and tests. All data
// is lost on restart (subscribers resume against an empty log).

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use lantern_core::{Event, EventId, EventStore, NewEvent, Result};

#[derive(Default)]
struct Inner {
    // (row id, event) in insertion order; row ids start at 1
    events: Vec<(EventId, Event)>,
    last_sequence: i64,
}

/// In-memory event log. All data is lost on restart.
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn persist_event(&self, event: NewEvent) -> Result<EventId> {
        let mut inner = self.inner.write();
        inner.last_sequence += 1;
        let id = EventId(inner.events.len() as i64 + 1);
        let sequence = inner.last_sequence;
        inner.events.push((
            id,
            Event {
                sequence,
                event_type: event.event_type,
                job_id: event.job_id,
                payload: event.payload,
                created_at: Utc::now(),
            },
        ));
        Ok(id)
    }

    async fn event_by_id(&self, id: EventId) -> Result<Option<Event>> {
        Ok(self
            .inner
            .read()
            .events
            .iter()
            .find(|(row_id, _)| *row_id == id)
            .map(|(_, event)| event.clone()))
    }

    async fn events_since(
        &self,
        after_sequence: i64,
        job_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Event>> {
        Ok(self
            .inner
            .read()
            .events
            .iter()
            .map(|(_, event)| event)
            .filter(|event| event.sequence > after_sequence)
            .filter(|event| match job_id {
                Some(job_id) => event.job_id.as_deref() == Some(job_id),
                None => true,
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn current_sequence(&self) -> Result<i64> {
        Ok(self.inner.read().last_sequence)
    }
}
