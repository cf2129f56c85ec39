use log::warn;
use serde_json::Value;

use crate::error::ParseError;
use crate::types::TimeBlockCandidate;

/// Extract time-block candidates from raw model output.
///
/// Three tiers: strip a single markdown code fence, strict-parse the
/// remainder, then fall back to scanning for the first balanced top-level
/// array (or a single object, wrapped as a one-element array). An explicitly
/// empty array is a valid, successful result; `ParseError::NoJson` is
/// reserved for output with no recoverable JSON structure at all.
pub fn parse(raw: &str) -> Result<Vec<TimeBlockCandidate>, ParseError> {
    let stripped = strip_code_fence(raw);
    let value = recover_value(stripped).ok_or(ParseError::NoJson)?;
    Ok(candidates_from(value))
}

fn recover_value(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text)
        && (value.is_array() || value.is_object())
    {
        return Some(value);
    }
    if let Some(slice) = balanced_slice(text, '[', ']')
        && let Ok(value) = serde_json::from_str(slice)
    {
        return Some(value);
    }
    if let Some(slice) = balanced_slice(text, '{', '}')
        && let Ok(value) = serde_json::from_str(slice)
    {
        return Some(value);
    }
    None
}

fn candidates_from(value: Value) -> Vec<TimeBlockCandidate> {
    let elements = match value {
        Value::Array(elements) => elements,
        // The model may return a bare object for a single-block case.
        object @ Value::Object(_) => vec![object],
        _ => Vec::new(),
    };
    elements
        .into_iter()
        .filter_map(|element| match serde_json::from_value(element) {
            Ok(candidate) => Some(candidate),
            Err(err) => {
                warn!("dropping malformed candidate element: {err}");
                None
            }
        })
        .collect()
}

/// Remove one leading/trailing markdown code fence, language-tagged or bare.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(newline) = rest.find('\n') else {
        return trimmed;
    };
    let body = rest[newline + 1..].trim_end();
    body.strip_suffix("```").map(str::trim).unwrap_or(body)
}

/// Find the first balanced `open`..`close` span, ignoring brackets inside
/// JSON strings.
fn balanced_slice(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..start + i + ch.len_utf8()]);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_array_is_a_successful_empty_result() {
        assert!(parse("[]").unwrap().is_empty());
    }

    #[test]
    fn prose_without_json_is_unparseable() {
        assert!(matches!(parse("not json at all"), Err(ParseError::NoJson)));
        assert!(matches!(parse(""), Err(ParseError::NoJson)));
    }

    #[test]
    fn strict_array_parses() {
        let candidates = parse(r#"[{"activity":"study","tag":"study"}]"#).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].activity.as_deref(), Some("study"));
    }

    #[test]
    fn tagged_fence_is_stripped() {
        let raw = "```json\n[{\"activity\":\"eat\"}]\n```";
        let candidates = parse(raw).unwrap();
        assert_eq!(candidates[0].activity.as_deref(), Some("eat"));
    }

    #[test]
    fn bare_fence_is_stripped() {
        let raw = "```\n[]\n```";
        assert!(parse(raw).unwrap().is_empty());
    }

    #[test]
    fn array_embedded_in_prose_is_recovered() {
        let raw = "Here are the blocks:\n[{\"activity\":\"run\"}]\nHope that helps!";
        let candidates = parse(raw).unwrap();
        assert_eq!(candidates[0].activity.as_deref(), Some("run"));
    }

    #[test]
    fn single_object_is_wrapped_in_an_array() {
        let candidates = parse(r#"{"activity":"eat","location":"home"}"#).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].location.as_deref(), Some("home"));
    }

    #[test]
    fn object_embedded_in_prose_is_recovered() {
        let raw = "Sure! {\"activity\":\"eat\"} Done.";
        let candidates = parse(raw).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn brackets_inside_strings_do_not_break_the_scan() {
        let raw = "note [{\"activity\":\"read [book]\",\"description\":\"a \\\" quote\"}] end";
        let candidates = parse(raw).unwrap();
        assert_eq!(candidates[0].activity.as_deref(), Some("read [book]"));
    }

    #[test]
    fn non_object_elements_are_dropped() {
        let candidates = parse(r#"[{"activity":"eat"}, 42, "noise"]"#).unwrap();
        assert_eq!(candidates.len(), 1);
    }
}
