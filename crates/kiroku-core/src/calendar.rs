use log::warn;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::error::CalendarError;
use crate::tags::CategoryConfiguration;
use crate::types::{ValidatedTimeBlock, iso_local};

/// Typed request for one calendar event. Writers turn this into whatever
/// automation their backend needs; the core never constructs script text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRequest {
    pub title: String,
    #[serde(with = "iso_local")]
    pub starts_at: PrimitiveDateTime,
    #[serde(with = "iso_local")]
    pub ends_at: PrimitiveDateTime,
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Target calendar, one per category tag.
    pub calendar_name: String,
    pub color: String,
}

impl EventRequest {
    pub fn from_block(block: &ValidatedTimeBlock, categories: &CategoryConfiguration) -> Self {
        let record = categories.resolve(Some(&block.tag));
        Self {
            title: block.activity.clone(),
            starts_at: block.start_time,
            ends_at: block.end_time,
            notes: block.description.clone(),
            location: block.location.clone(),
            calendar_name: record.name,
            color: record.color,
        }
    }
}

/// External calendar automation boundary. Implementations own everything
/// past the typed request: scripting, process control, timeouts.
pub trait CalendarWriter {
    /// Create one event, returning the backend's event identifier.
    fn add_event(&self, request: &EventRequest) -> Result<String, CalendarError>;

    /// Delete previously created events from one calendar.
    fn delete_events(&self, calendar_name: &str, event_ids: &[String]) -> Result<(), CalendarError>;
}

/// One successfully written event, kept for the undo journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrittenEvent {
    pub event_id: String,
    pub request: EventRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub title: String,
    pub error: String,
}

/// Outcome of one batch write; items succeed or fail independently.
#[derive(Debug, Default, Serialize)]
pub struct BatchOutcome {
    pub written: Vec<WrittenEvent>,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn all_failed(&self) -> bool {
        self.written.is_empty() && !self.failures.is_empty()
    }
}

/// Write each block as its own event, tolerating partial failure.
pub fn write_batch(
    writer: &dyn CalendarWriter,
    blocks: &[ValidatedTimeBlock],
    categories: &CategoryConfiguration,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for block in blocks {
        let request = EventRequest::from_block(block, categories);
        match writer.add_event(&request) {
            Ok(event_id) => outcome.written.push(WrittenEvent { event_id, request }),
            Err(err) => {
                warn!("calendar write failed for {:?}: {err}", request.title);
                outcome.failures.push(BatchFailure {
                    title: request.title,
                    error: err.to_string(),
                });
            }
        }
    }
    outcome
}
