use log::info;
use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::tags::CategoryConfiguration;
use crate::types::{TimeAnchor, TimeBlockCandidate, ValidatedTimeBlock};

/// Human-readable explanation attached to a successful-but-empty result.
pub const EMPTY_RESULT_NOTICE: &str =
    "no valid time segment found; a block needs a complete start/end and at least one minute of duration";

const ISO_T: &[BorrowedFormatItem<'static>] = format_description!(
    version = 2,
    "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
);
const ISO_SPACE: &[BorrowedFormatItem<'static>] = format_description!(
    version = 2,
    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
);

/// Lexical vocabulary and thresholds for validation and relative-time
/// correction. Constructed once at startup and passed into the pipeline.
#[derive(Debug, Clone)]
pub struct ValidatorRules {
    /// Activity values treated as "no activity", case-insensitive.
    pub null_tokens: Vec<String>,
    /// Transcript phrases marking a span that ends at the anchor.
    pub relative_triggers: Vec<String>,
    /// Transcript phrases marking a thirty-minute span.
    pub half_hour_markers: Vec<String>,
    /// How far a candidate start may sit from `anchor - 30min` before the
    /// half-hour correction overrides it.
    pub start_tolerance: Duration,
    pub min_duration: Duration,
}

impl Default for ValidatorRules {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|item| item.to_string()).collect()
        }
        Self {
            null_tokens: owned(&["none", "null", "n/a", "无", "無"]),
            relative_triggers: owned(&[
                "just now",
                "a moment ago",
                "moments ago",
                "half an hour ago",
                "刚刚",
                "刚才",
                "半小时前",
                "半小時前",
            ]),
            half_hour_markers: owned(&["half an hour", "half hour", "半小时", "半小時"]),
            start_tolerance: Duration::seconds(300),
            min_duration: Duration::seconds(60),
        }
    }
}

impl ValidatorRules {
    fn is_null_activity(&self, activity: &str) -> bool {
        let trimmed = activity.trim();
        trimmed.is_empty()
            || self
                .null_tokens
                .iter()
                .any(|token| trimmed.eq_ignore_ascii_case(token))
    }

    fn has_relative_trigger(&self, transcript: &str) -> bool {
        contains_any(transcript, &self.relative_triggers)
    }

    fn has_half_hour_marker(&self, transcript: &str) -> bool {
        contains_any(transcript, &self.half_hour_markers)
    }
}

fn contains_any(transcript: &str, phrases: &[String]) -> bool {
    let lower = transcript.to_lowercase();
    phrases
        .iter()
        .any(|phrase| lower.contains(&phrase.to_lowercase()))
}

#[derive(Debug, Error)]
enum RejectReason {
    #[error("start_time missing")]
    MissingStart,
    #[error("end_time missing")]
    MissingEnd,
    #[error("activity empty or null token")]
    NullActivity,
    #[error("unparseable {field}: {raw:?}")]
    BadTimestamp { field: &'static str, raw: String },
    #[error("duration {0}s below minimum")]
    TooShort(i64),
}

/// Validate and correct candidates against the anchor and category snapshot.
/// Invalid candidates are dropped with a logged reason; dropping all of them
/// is not an error (the caller reports [`EMPTY_RESULT_NOTICE`]).
pub fn validate(
    candidates: Vec<TimeBlockCandidate>,
    transcript: &str,
    anchor: &TimeAnchor,
    categories: &CategoryConfiguration,
    rules: &ValidatorRules,
    model_id: &str,
) -> Vec<ValidatedTimeBlock> {
    let relative = rules.has_relative_trigger(transcript);
    let half_hour = relative && rules.has_half_hour_marker(transcript);
    candidates
        .into_iter()
        .filter_map(|candidate| {
            match validate_one(
                candidate, relative, half_hour, anchor, categories, rules, model_id,
            ) {
                Ok(block) => Some(block),
                Err(reason) => {
                    info!("dropping candidate: {reason}");
                    None
                }
            }
        })
        .collect()
}

fn validate_one(
    candidate: TimeBlockCandidate,
    relative: bool,
    half_hour: bool,
    anchor: &TimeAnchor,
    categories: &CategoryConfiguration,
    rules: &ValidatorRules,
    model_id: &str,
) -> Result<ValidatedTimeBlock, RejectReason> {
    let activity = candidate.activity.unwrap_or_default();
    if rules.is_null_activity(&activity) {
        return Err(RejectReason::NullActivity);
    }
    let start_raw = non_empty(candidate.start_time).ok_or(RejectReason::MissingStart)?;
    let end_raw = non_empty(candidate.end_time).ok_or(RejectReason::MissingEnd)?;

    let mut start =
        parse_timestamp(&start_raw, anchor.offset).ok_or_else(|| RejectReason::BadTimestamp {
            field: "start_time",
            raw: start_raw.clone(),
        })?;
    let mut end =
        parse_timestamp(&end_raw, anchor.offset).ok_or_else(|| RejectReason::BadTimestamp {
            field: "end_time",
            raw: end_raw.clone(),
        })?;

    if relative {
        // Generative extraction is unreliable at resolving deictic time
        // references, so a recognized trigger overrides the model: the span
        // always ends at the instant of invocation.
        if end != anchor.local {
            info!("snapping end_time {} to anchor {}", end_raw, anchor.iso());
        }
        end = anchor.local;
        if half_hour {
            let target = anchor.minus_minutes(30);
            let drift = (start - target).abs();
            if drift > rules.start_tolerance {
                info!("snapping start_time {start_raw} to {target}");
                start = target;
            }
        }
    }

    // Checked after correction so an emitted block always satisfies
    // start < end regardless of what the correction moved.
    let duration = end - start;
    if duration < rules.min_duration {
        return Err(RejectReason::TooShort(duration.whole_seconds()));
    }

    let tag = match candidate.tag {
        Some(tag) if categories.contains(tag.trim()) => tag.trim().to_string(),
        _ => categories.default_name().to_string(),
    };

    Ok(ValidatedTimeBlock {
        activity: activity.trim().to_string(),
        start_time: start,
        end_time: end,
        location: non_empty(candidate.location),
        description: annotate_description(candidate.description.as_deref(), model_id),
        tag,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Append the producing model's identifier for provenance.
fn annotate_description(description: Option<&str>, model_id: &str) -> String {
    let base = description
        .unwrap_or_default()
        .trim()
        .trim_end_matches('-')
        .trim();
    if base.is_empty() {
        format!("[model: {model_id}]")
    } else {
        format!("{base} [model: {model_id}]")
    }
}

/// Parse a model timestamp into local naive time. Offset-bearing forms
/// (including a literal `Z`) are converted to the anchor's offset first,
/// then the offset is discarded; the pipeline has no concept of
/// multi-timezone scheduling.
fn parse_timestamp(raw: &str, local_offset: UtcOffset) -> Option<PrimitiveDateTime> {
    let raw = raw.trim();
    if let Ok(instant) = OffsetDateTime::parse(raw, &Rfc3339) {
        let local = instant.to_offset(local_offset);
        return Some(PrimitiveDateTime::new(local.date(), local.time()));
    }
    PrimitiveDateTime::parse(raw, ISO_T)
        .or_else(|_| PrimitiveDateTime::parse(raw, ISO_SPACE))
        .ok()
}
