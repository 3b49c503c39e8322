// Replay buffer - bounded-memory catch-up for reconnecting subscribers
//
// Reads the event log in fixed-size chunks behind a moving cursor, so a
// subscriber resuming against an arbitrarily large backlog never holds more
// than one chunk in memory.

use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};

use lantern_core::{Event, EventStore, Result};

/// Events fetched from the store per round trip.
pub const DEFAULT_CHUNK_SIZE: i64 = 1000;

/// Replays persisted events after a resume point.
///
/// Purely a function of (after_sequence, job_id, store contents): replaying
/// twice against an unchanged store yields identical sequences.
#[derive(Clone)]
pub struct ReplayBuffer {
    store: Arc<dyn EventStore>,
    chunk_size: i64,
}

impl ReplayBuffer {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self::with_chunk_size(store, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(store: Arc<dyn EventStore>, chunk_size: i64) -> Self {
        Self { store, chunk_size }
    }

    /// Stream every persisted event with sequence greater than
    /// `after_sequence`, in sequence order, optionally filtered by job id.
    ///
    /// A chunk shorter than the chunk size signals exhaustion, so the final
    /// round trip is never an empty one.
    pub fn replay_events(
        &self,
        after_sequence: i64,
        job_id: Option<String>,
    ) -> impl Stream<Item = Result<Event>> + Send + 'static {
        let store = self.store.clone();
        let chunk_size = self.chunk_size;

        stream::try_unfold(
            (after_sequence, false),
            move |(cursor, exhausted)| {
                let store = store.clone();
                let job_id = job_id.clone();
                async move {
                    if exhausted {
                        return Ok::<_, lantern_core::EngineError>(None);
                    }
                    let chunk = store
                        .events_since(cursor, job_id.as_deref(), chunk_size)
                        .await?;
                    if chunk.is_empty() {
                        return Ok(None);
                    }
                    let next_cursor = chunk.last().map(|e| e.sequence).unwrap_or(cursor);
                    let exhausted = (chunk.len() as i64) < chunk_size;
                    Ok(Some((
                        stream::iter(chunk.into_iter().map(Ok)),
                        (next_cursor, exhausted),
                    )))
                }
            },
        )
        .try_flatten()
    }

    /// Current highest persisted sequence - tells a caller whether a resume
    /// point has anything to catch up on.
    pub async fn max_sequence(&self) -> Result<i64> {
        self.store.current_sequence().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lantern_core::{EventId, NewEvent};
    use lantern_storage::InMemoryEventStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps a store and counts read round trips.
    struct CountingStore {
        inner: InMemoryEventStore,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl EventStore for CountingStore {
        async fn persist_event(&self, event: NewEvent) -> Result<EventId> {
            self.inner.persist_event(event).await
        }

        async fn event_by_id(&self, id: EventId) -> Result<Option<Event>> {
            self.inner.event_by_id(id).await
        }

        async fn events_since(
            &self,
            after_sequence: i64,
            job_id: Option<&str>,
            limit: i64,
        ) -> Result<Vec<Event>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.events_since(after_sequence, job_id, limit).await
        }

        async fn current_sequence(&self) -> Result<i64> {
            self.inner.current_sequence().await
        }
    }

    async fn seeded(count: usize) -> Arc<CountingStore> {
        let store = CountingStore {
            inner: InMemoryEventStore::new(),
            fetches: AtomicUsize::new(0),
        };
        for i in 0..count {
            let job = if i % 2 == 0 { "even" } else { "odd" };
            store
                .persist_event(
                    NewEvent::new("tick")
                        .with_job_id(job)
                        .with_payload(json!({ "i": i })),
                )
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_replay_yields_everything_after_resume_point() {
        let store = seeded(10).await;
        let replay = ReplayBuffer::with_chunk_size(store, 4);

        let events: Vec<Event> = replay.replay_events(3, None).try_collect().await.unwrap();
        let sequences: Vec<i64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![4, 5, 6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn test_replay_is_deterministic() {
        let store = seeded(7).await;
        let replay = ReplayBuffer::with_chunk_size(store, 3);

        let first: Vec<i64> = replay
            .replay_events(0, None)
            .try_collect::<Vec<_>>()
            .await
            .unwrap()
            .iter()
            .map(|e| e.sequence)
            .collect();
        let second: Vec<i64> = replay
            .replay_events(0, None)
            .try_collect::<Vec<_>>()
            .await
            .unwrap()
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_short_chunk_ends_replay_without_empty_round_trip() {
        let store = seeded(9).await;
        let replay = ReplayBuffer::with_chunk_size(store.clone(), 5);

        let events: Vec<Event> = replay.replay_events(0, None).try_collect().await.unwrap();
        assert_eq!(events.len(), 9);
        // 5 + 4: the short second chunk signals exhaustion
        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exact_chunk_multiple_needs_one_empty_fetch() {
        let store = seeded(10).await;
        let replay = ReplayBuffer::with_chunk_size(store.clone(), 5);

        let events: Vec<Event> = replay.replay_events(0, None).try_collect().await.unwrap();
        assert_eq!(events.len(), 10);
        // 5 + 5 + empty: full chunks cannot prove exhaustion
        assert_eq!(store.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_replay_with_job_filter() {
        let store = seeded(6).await;
        let replay = ReplayBuffer::with_chunk_size(store, 2);

        let events: Vec<Event> = replay
            .replay_events(0, Some("even".to_string()))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.job_id.as_deref() == Some("even")));
    }

    #[tokio::test]
    async fn test_max_sequence() {
        let store = seeded(4).await;
        let replay = ReplayBuffer::new(store);
        assert_eq!(replay.max_sequence().await.unwrap(), 4);
    }
}
