use std::fs;
use std::path::Path;

use crate::error::TemplateError;
use crate::tags::CategoryConfiguration;
use crate::types::{TimeAnchor, format_local};

const SYSTEM_PROMPT: &str = r#"You are a time tracking assistant. Extract every time block from the user's spoken transcript and return a JSON array.

Current time: {current_time} (format: YYYY-MM-DD HH:MM:SS, 24-hour clock).

Fields per block:
- "activity" (required): what the user was doing
- "start_time" (required): YYYY-MM-DDTHH:MM:SS, 24-hour clock
- "end_time" (required): YYYY-MM-DDTHH:MM:SS, 24-hour clock
- "location" (optional): place, if the transcript mentions one
- "description" (optional): extra detail worth keeping
- "tag" (required): exactly one category name from the rubric below

Categories:
{categories}

Rules:
1. Extract EVERY time interval in the transcript, never dropping intermediate segments. "Left home at 8, arrived at the cafe at 9" contains a block from 08:00 to 09:00 (the commute) even though no activity is named for it.
2. Relative phrases ("just now", "a moment ago", "half an hour ago") describe PAST spans that end at the current time, never future spans. If the current time is {current_time}, "just now for half an hour" ends at {current_time}, not earlier and not later.
3. Use the 24-hour clock and disambiguate from context: "morning 8" is 08:00, "evening 8" is 20:00.
4. Return ONLY a JSON array. No prose, no explanations, no markdown fences. Start with [ and end with ]."#;

const USER_PROMPT: &str = r#"Extract time blocks from the following transcript. Return only a JSON array.

Transcript: {transcript}

Current time: {current_time} (ISO: {current_time_iso})

Work in two steps:
1. List every time point the transcript mentions, resolving relative phrases against the current time ("half an hour ago" is {past_30min_iso}).
2. Emit one block for each pair of adjacent time points, inferring from the transcript what happened in between.

Format: [{"activity": "...", "start_time": "...", "end_time": "...", "location": "...", "tag": "..."}]"#;

/// Prompt templates resolved once at startup. `None` fields fall back to the
/// built-in text; using the built-ins is not an error condition.
#[derive(Debug, Clone, Default)]
pub struct PromptTemplates {
    pub system: Option<String>,
    pub user: Option<String>,
}

impl PromptTemplates {
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Load templates from a markdown file with `## System Prompt` and
    /// `## User Prompt` sections, each holding one fenced code block. A
    /// missing section leaves the corresponding built-in in place; a file
    /// with neither section is rejected.
    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let content = fs::read_to_string(path)?;
        let system = extract_section(&content, "## System Prompt");
        let user = extract_section(&content, "## User Prompt");
        if system.is_none() && user.is_none() {
            return Err(TemplateError::NoSections);
        }
        Ok(Self { system, user })
    }
}

/// A composed system/user prompt pair, ready for a chat backend.
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
}

/// Build the prompt pair for one transcript. Pure function of its inputs
/// plus the read-only category snapshot.
pub fn compose(
    transcript: &str,
    anchor: &TimeAnchor,
    categories: &CategoryConfiguration,
    templates: &PromptTemplates,
) -> ComposedPrompt {
    let rubric = category_rubric(categories);
    let past_30min = format_local(anchor.minus_minutes(30), 'T');
    ComposedPrompt {
        system: fill(
            templates.system.as_deref().unwrap_or(SYSTEM_PROMPT),
            transcript,
            anchor,
            &rubric,
            &past_30min,
        ),
        user: fill(
            templates.user.as_deref().unwrap_or(USER_PROMPT),
            transcript,
            anchor,
            &rubric,
            &past_30min,
        ),
    }
}

fn fill(
    template: &str,
    transcript: &str,
    anchor: &TimeAnchor,
    rubric: &str,
    past_30min: &str,
) -> String {
    template
        .replace("{current_time}", &anchor.display())
        .replace("{current_time_iso}", &anchor.iso())
        .replace("{past_30min_iso}", past_30min)
        .replace("{categories}", rubric)
        .replace("{transcript}", transcript)
}

/// One rubric line per category; the name alone when there is no
/// description.
fn category_rubric(categories: &CategoryConfiguration) -> String {
    categories
        .records()
        .iter()
        .map(|record| {
            let description = record.description.trim();
            if description.is_empty() {
                format!("- {}", record.name)
            } else {
                format!("- {}: {}", record.name, description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_section(content: &str, heading: &str) -> Option<String> {
    let start = content.find(heading)?;
    let rest = &content[start + heading.len()..];
    let fence_start = rest.find("```")?;
    let after_fence = &rest[fence_start + 3..];
    // Skip the fence's language tag line, if any.
    let body = &after_fence[after_fence.find('\n')? + 1..];
    let fence_end = body.find("```")?;
    let section = body[..fence_end].trim();
    if section.is_empty() {
        None
    } else {
        Some(section.to_string())
    }
}
