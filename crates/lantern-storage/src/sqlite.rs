// SQLite-backed event log
//
// Sequence numbers are assigned inside the insert transaction via the
// sequence_state row, so they are gap-free and never reused even across
// process restarts.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use lantern_core::{EngineError, Event, EventId, EventStore, NewEvent, Result};

const SCHEMA_SQL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sequence_number INTEGER NOT NULL UNIQUE,
        event_type TEXT NOT NULL,
        job_id TEXT,
        payload_json TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_events_sequence ON events(sequence_number)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_events_job_sequence ON events(job_id, sequence_number)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sequence_state (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        last_sequence INTEGER NOT NULL
    )
    "#,
    r#"
    INSERT OR IGNORE INTO sequence_state (id, last_sequence) VALUES (1, 0)
    "#,
];

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    #[allow(dead_code)]
    id: i64,
    sequence_number: i64,
    event_type: String,
    job_id: Option<String>,
    payload_json: String,
    created_at: DateTime<Utc>,
}

impl EventRow {
    fn into_event(self) -> Result<Event> {
        let payload = serde_json::from_str(&self.payload_json)
            .map_err(|e| EngineError::store(format!("corrupt payload json: {e}")))?;
        Ok(Event {
            sequence: self.sequence_number,
            event_type: self.event_type,
            job_id: self.job_id,
            payload,
            created_at: self.created_at,
        })
    }
}

/// Durable event log backed by embedded SQLite.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) a database at the given filesystem path.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        Self::connect(options).await
    }

    /// Open a database from a sqlite URL (e.g. `sqlite::memory:`).
    pub async fn from_url(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| EngineError::store(e.to_string()))?
            .create_if_missing(true);
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // SQLite allows one writer; a single pooled connection avoids busy
        // errors and keeps in-memory databases on one connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| EngineError::store(e.to_string()))?;
        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Apply the event-log schema. Idempotent.
    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA_SQL {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| EngineError::store(e.to_string()))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn persist_event(&self, event: NewEvent) -> Result<EventId> {
        let payload_json = serde_json::to_string(&event.payload)
            .map_err(|e| EngineError::store(e.to_string()))?;
        let created_at = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::store(e.to_string()))?;

        // Atomically claim the next global sequence number
        let (sequence,): (i64,) = sqlx::query_as(
            r#"
            UPDATE sequence_state
            SET last_sequence = last_sequence + 1
            WHERE id = 1
            RETURNING last_sequence
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| EngineError::store(e.to_string()))?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO events (sequence_number, event_type, job_id, payload_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(sequence)
        .bind(&event.event_type)
        .bind(&event.job_id)
        .bind(&payload_json)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| EngineError::store(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| EngineError::store(e.to_string()))?;

        Ok(EventId(id))
    }

    async fn event_by_id(&self, id: EventId) -> Result<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, sequence_number, event_type, job_id, payload_json, created_at
            FROM events
            WHERE id = ?
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EngineError::store(e.to_string()))?;

        row.map(EventRow::into_event).transpose()
    }

    async fn events_since(
        &self,
        after_sequence: i64,
        job_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Event>> {
        let rows = if let Some(job_id) = job_id {
            sqlx::query_as::<_, EventRow>(
                r#"
                SELECT id, sequence_number, event_type, job_id, payload_json, created_at
                FROM events
                WHERE sequence_number > ? AND job_id = ?
                ORDER BY sequence_number
                LIMIT ?
                "#,
            )
            .bind(after_sequence)
            .bind(job_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, EventRow>(
                r#"
                SELECT id, sequence_number, event_type, job_id, payload_json, created_at
                FROM events
                WHERE sequence_number > ?
                ORDER BY sequence_number
                LIMIT ?
                "#,
            )
            .bind(after_sequence)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| EngineError::store(e.to_string()))?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn current_sequence(&self) -> Result<i64> {
        let (sequence,): (i64,) =
            sqlx::query_as("SELECT last_sequence FROM sequence_state WHERE id = 1")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| EngineError::store(e.to_string()))?;
        Ok(sequence)
    }
}
