// Event broadcaster - fans persisted events out to live connections
//
// The broadcaster ONLY accepts persisted event row ids, never raw event
// objects. Holding an EventId proves the event was durably written: a crash
// before the write means nothing was announced, a crash after the write is
// recoverable through replay, never corrupted or double-delivered here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use utoipa::ToSchema;
use uuid::Uuid;

use lantern_core::{EngineError, Event, EventId, EventStore, Result};

/// Queue capacity per connection. A subscriber that falls this far behind is
/// disconnected and must catch up via replay.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Receiving half of a registered connection, handed to the subscriber task.
pub struct Connection {
    id: Uuid,
    rx: mpsc::Receiver<Event>,
}

impl Connection {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Registry-side state of a connection.
struct ConnectionEntry {
    tx: mpsc::Sender<Event>,
    last_sequence: i64,
    closed: bool,
    created_at: DateTime<Utc>,
}

/// Item yielded while draining a connection's live queue.
#[derive(Debug)]
pub enum StreamItem {
    Event(Event),
    /// The idle timeout elapsed with nothing queued - a tick, not an error.
    Keepalive,
}

/// Point-in-time view of one registered connection, for diagnostics.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionStats {
    pub id: Uuid,
    pub last_sequence: i64,
    pub queued: usize,
    pub created_at: DateTime<Utc>,
}

/// Broadcasts persisted events to live connections.
///
/// Each connection owns a bounded FIFO queue; a full queue disconnects that
/// connection only (subscribers replay from the store), so no producer is
/// ever blocked by a stalled consumer.
pub struct EventBroadcaster {
    store: Arc<dyn EventStore>,
    connections: Mutex<HashMap<Uuid, ConnectionEntry>>,
    queue_capacity: usize,
}

impl EventBroadcaster {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self::with_queue_capacity(store, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(store: Arc<dyn EventStore>, queue_capacity: usize) -> Self {
        Self {
            store,
            connections: Mutex::new(HashMap::new()),
            queue_capacity,
        }
    }

    /// Register a new connection with a fresh bounded queue.
    pub fn add_connection(&self) -> Connection {
        self.add_connection_with_id(Uuid::now_v7())
    }

    /// Register a new connection under a caller-supplied id.
    pub fn add_connection_with_id(&self, id: Uuid) -> Connection {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let entry = ConnectionEntry {
            tx,
            last_sequence: 0,
            closed: false,
            created_at: Utc::now(),
        };
        self.connections.lock().insert(id, entry);
        tracing::debug!(connection_id = %id, "connection added");
        Connection { id, rx }
    }

    /// Remove a connection from the registry. Idempotent.
    pub fn remove_connection(&self, connection_id: Uuid) {
        if self.connections.lock().remove(&connection_id).is_some() {
            tracing::debug!(connection_id = %connection_id, "connection removed");
        }
    }

    /// Broadcast a persisted event to all open connections.
    ///
    /// This is the ONLY way events reach subscribers. The id must come from
    /// the store; an unknown id is a contract violation by the caller
    /// (announce-before-persist) and fails loudly.
    ///
    /// Returns the number of connections the event was enqueued for.
    pub async fn broadcast_by_id(&self, event_id: EventId) -> Result<usize> {
        let event = self
            .store
            .event_by_id(event_id)
            .await?
            .ok_or(EngineError::EventNotFound(event_id))?;

        let delivered = {
            let mut connections = self.connections.lock();
            let mut delivered = 0;
            for (id, entry) in connections.iter_mut() {
                if entry.closed {
                    continue;
                }
                match entry.tx.try_send(event.clone()) {
                    Ok(()) => {
                        entry.last_sequence = event.sequence;
                        delivered += 1;
                    }
                    Err(TrySendError::Full(_)) => {
                        // Reader too slow - mark for eviction, never block the producer
                        tracing::warn!(connection_id = %id, "connection queue full, disconnecting");
                        entry.closed = true;
                    }
                    Err(TrySendError::Closed(_)) => {
                        entry.closed = true;
                    }
                }
            }
            delivered
        };

        // Eviction happens after the fan-out pass, never mid-iteration
        self.sweep_closed();
        Ok(delivered)
    }

    /// Send a persisted event to one connection.
    ///
    /// Returns false if the connection is unknown or closed, or if its queue
    /// overflowed (the connection is then marked closed and swept like any
    /// other overflow).
    pub async fn send_to_connection(&self, connection_id: Uuid, event_id: EventId) -> Result<bool> {
        let event = self
            .store
            .event_by_id(event_id)
            .await?
            .ok_or(EngineError::EventNotFound(event_id))?;
        let sequence = event.sequence;

        let sent = {
            let mut connections = self.connections.lock();
            match connections.get_mut(&connection_id) {
                None => false,
                Some(entry) if entry.closed => false,
                Some(entry) => match entry.tx.try_send(event) {
                    Ok(()) => {
                        entry.last_sequence = sequence;
                        true
                    }
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(connection_id = %connection_id, "connection queue full, disconnecting");
                        entry.closed = true;
                        false
                    }
                    Err(TrySendError::Closed(_)) => {
                        entry.closed = true;
                        false
                    }
                },
            }
        };

        self.sweep_closed();
        Ok(sent)
    }

    /// Drain a connection's queue as a stream.
    ///
    /// Yields a Keepalive item whenever `timeout` elapses with nothing
    /// queued; terminates once the connection has been evicted and its
    /// queue is drained.
    pub fn events(
        &self,
        connection: Connection,
        timeout: Duration,
    ) -> impl Stream<Item = StreamItem> + Send + 'static {
        ReceiverStream::new(connection.rx)
            .timeout(timeout)
            .map(|item| match item {
                Ok(event) => StreamItem::Event(event),
                Err(_elapsed) => StreamItem::Keepalive,
            })
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn connection_stats(&self) -> Vec<ConnectionStats> {
        self.connections
            .lock()
            .iter()
            .map(|(id, entry)| ConnectionStats {
                id: *id,
                last_sequence: entry.last_sequence,
                queued: entry.tx.max_capacity() - entry.tx.capacity(),
                created_at: entry.created_at,
            })
            .collect()
    }

    /// Evict everything marked closed during a fan-out pass.
    fn sweep_closed(&self) {
        self.connections.lock().retain(|id, entry| {
            if entry.closed {
                tracing::debug!(connection_id = %id, "evicting closed connection");
            }
            !entry.closed
        });
    }
}
