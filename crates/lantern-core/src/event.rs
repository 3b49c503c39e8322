// Event entity types
//
// An Event is a notification record persisted in the event log and streamed
// to subscribers over SSE. The sequence number is global, strictly
// increasing, and assigned by the store at write time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Row id of a persisted event.
///
/// This is the only currency the broadcaster accepts: holding an EventId
/// means the event was already durably written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct EventId(pub i64);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event - persisted notification record streamed to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Event {
    /// Global sequence number, strictly increasing, assigned by the store
    pub sequence: i64,
    pub event_type: String,
    /// Correlation id of the job this event belongs to (None for engine-level events)
    pub job_id: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Write-side input to the store. Carries no sequence number - the store
/// assigns one atomically when the event is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_type: String,
    pub job_id: Option<String>,
    pub payload: serde_json::Value,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            job_id: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_event_builder() {
        let event = NewEvent::new("job.progress")
            .with_job_id("job-1")
            .with_payload(json!({"percent": 40}));

        assert_eq!(event.event_type, "job.progress");
        assert_eq!(event.job_id.as_deref(), Some("job-1"));
        assert_eq!(event.payload["percent"], 40);
    }

    #[test]
    fn test_event_serialization_roundtrip() {
        let event = Event {
            sequence: 42,
            event_type: "job.progress".to_string(),
            job_id: Some("job-1".to_string()),
            payload: json!({"percent": 40}),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sequence"], 42);
        assert_eq!(json["event_type"], "job.progress");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.sequence, event.sequence);
        assert_eq!(back.job_id, event.job_id);
    }
}
