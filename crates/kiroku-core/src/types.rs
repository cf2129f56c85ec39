use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// The wall-clock instant treated as "now" for resolving relative time
/// expressions. Supplied once per extraction call and immutable for its
/// duration.
///
/// Carries both the local naive datetime and the UTC offset that was in
/// effect, so offset-bearing model timestamps can be converted to the
/// equivalent local instant without consulting global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeAnchor {
    pub local: PrimitiveDateTime,
    pub offset: UtcOffset,
}

impl TimeAnchor {
    pub fn new(local: PrimitiveDateTime, offset: UtcOffset) -> Self {
        Self { local, offset }
    }

    pub fn from_offset_datetime(instant: OffsetDateTime) -> Self {
        Self {
            local: PrimitiveDateTime::new(instant.date(), instant.time()),
            offset: instant.offset(),
        }
    }

    /// `YYYY-MM-DD HH:MM:SS`, 24-hour; the unambiguous form embedded in
    /// prompts.
    pub fn display(&self) -> String {
        format_local(self.local, ' ')
    }

    /// `YYYY-MM-DDTHH:MM:SS`, the wire form for timestamps.
    pub fn iso(&self) -> String {
        format_local(self.local, 'T')
    }

    pub fn minus_minutes(&self, minutes: i64) -> PrimitiveDateTime {
        self.local - Duration::minutes(minutes)
    }
}

/// One incoming extraction request: the transcript text plus an optional
/// request to try the configured alternate backend first.
#[derive(Debug, Clone)]
pub struct TranscriptInput {
    pub transcript: String,
    pub use_alternate_backend: bool,
}

impl TranscriptInput {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            use_alternate_backend: false,
        }
    }
}

/// A raw time-block candidate as returned by the model, before validation.
/// Any field may be absent, empty, or malformed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimeBlockCandidate {
    pub activity: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub tag: Option<String>,
}

/// A time block that passed validation and correction.
///
/// Invariants: `start_time < end_time`, duration >= 60 s, `activity`
/// non-empty and not a null token, `tag` is a configured category name,
/// `description` carries the producing model's identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedTimeBlock {
    pub activity: String,
    #[serde(with = "iso_local")]
    pub start_time: PrimitiveDateTime,
    #[serde(with = "iso_local")]
    pub end_time: PrimitiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub description: String,
    pub tag: String,
}

impl ValidatedTimeBlock {
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

/// One failed backend attempt, with its classified reason.
#[derive(Debug, Clone, Serialize)]
pub struct BackendAttempt {
    pub backend: String,
    pub kind: &'static str,
    pub reason: String,
}

/// The pipeline's final output. An empty `blocks` sequence is a valid,
/// non-error outcome; `notice` then explains why.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub blocks: Vec<ValidatedTimeBlock>,
    pub backend: String,
    pub model: String,
    pub raw_response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// Format a local naive datetime with the given date/time separator.
pub(crate) fn format_local(dt: PrimitiveDateTime, separator: char) -> String {
    format!(
        "{:04}-{:02}-{:02}{}{:02}:{:02}:{:02}",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        separator,
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}

/// Serde helpers for `YYYY-MM-DDTHH:MM:SS` local naive timestamps.
pub(crate) mod iso_local {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use time::PrimitiveDateTime;
    use time::format_description::BorrowedFormatItem;
    use time::macros::format_description;

    const FORMAT: &[BorrowedFormatItem<'static>] =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

    pub fn serialize<S: Serializer>(
        dt: &PrimitiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_local(*dt, 'T'))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<PrimitiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PrimitiveDateTime::parse(&raw, FORMAT).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn anchor_display_is_space_separated_24h() {
        let anchor = TimeAnchor::new(datetime!(2024-01-01 20:05:09), UtcOffset::UTC);
        assert_eq!(anchor.display(), "2024-01-01 20:05:09");
        assert_eq!(anchor.iso(), "2024-01-01T20:05:09");
    }

    #[test]
    fn anchor_minus_minutes_crosses_midnight() {
        let anchor = TimeAnchor::new(datetime!(2024-01-01 00:10:00), UtcOffset::UTC);
        assert_eq!(anchor.minus_minutes(30), datetime!(2023-12-31 23:40:00));
    }

    #[test]
    fn validated_block_round_trips_local_timestamps() {
        let block = ValidatedTimeBlock {
            activity: "study".to_string(),
            start_time: datetime!(2024-01-01 09:00:00),
            end_time: datetime!(2024-01-01 09:30:00),
            location: None,
            description: "[model: test]".to_string(),
            tag: "study".to_string(),
        };
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"start_time\":\"2024-01-01T09:00:00\""));
        assert!(!json.contains("location"));
        let back: ValidatedTimeBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn candidate_tolerates_missing_and_null_fields() {
        let candidate: TimeBlockCandidate =
            serde_json::from_str(r#"{"activity":"eat","start_time":null}"#).unwrap();
        assert_eq!(candidate.activity.as_deref(), Some("eat"));
        assert!(candidate.start_time.is_none());
        assert!(candidate.end_time.is_none());
    }
}
