use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use kiroku_core::calendar::{CalendarWriter, EventRequest};
use kiroku_core::error::CalendarError;
use log::debug;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Writes events into the macOS Calendar app by driving `osascript`.
///
/// Event times are expressed as second offsets from `(current date)`, so the
/// script never has to spell out a locale-dependent date literal.
pub struct OsaScriptWriter {
    add_timeout_secs: u64,
    undo_timeout_secs: u64,
}

impl OsaScriptWriter {
    pub fn new(add_timeout_secs: u64, undo_timeout_secs: u64) -> Self {
        Self {
            add_timeout_secs,
            undo_timeout_secs,
        }
    }
}

impl CalendarWriter for OsaScriptWriter {
    fn add_event(&self, request: &EventRequest) -> Result<String, CalendarError> {
        let statements = add_event_statements(request, local_now());
        let output = run_statements(&statements, self.add_timeout_secs)?;
        let event_id = output.trim();
        if event_id.is_empty() {
            return Err(CalendarError::Script("no event id returned".into()));
        }
        Ok(event_id.to_string())
    }

    fn delete_events(&self, calendar_name: &str, event_ids: &[String]) -> Result<(), CalendarError> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let statements = delete_statements(calendar_name, event_ids);
        run_statements(&statements, self.undo_timeout_secs)?;
        Ok(())
    }
}

fn local_now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    PrimitiveDateTime::new(now.date(), now.time())
}

/// Escape for an AppleScript double-quoted string literal.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            other => escaped.push(other),
        }
    }
    escaped
}

fn add_event_statements(request: &EventRequest, now: PrimitiveDateTime) -> Vec<String> {
    let start_offset = (request.starts_at - now).whole_seconds();
    let end_offset = (request.ends_at - now).whole_seconds();

    let mut properties = format!(
        "summary:\"{}\", start date:(current date) + {start_offset}, \
         end date:(current date) + {end_offset}, description:\"{}\"",
        escape(&request.title),
        escape(&request.notes),
    );
    if let Some(location) = &request.location {
        properties.push_str(&format!(", location:\"{}\"", escape(location)));
    }

    vec![
        "tell application \"Calendar\"".to_string(),
        format!("set calendarName to \"{}\"", escape(&request.calendar_name)),
        "try".to_string(),
        "set targetCalendar to calendar calendarName".to_string(),
        "on error".to_string(),
        "make new calendar with properties {name:calendarName}".to_string(),
        "set targetCalendar to calendar calendarName".to_string(),
        "end try".to_string(),
        "tell targetCalendar".to_string(),
        format!("set newEvent to make new event at end with properties {{{properties}}}"),
        "end tell".to_string(),
        "set eventId to uid of newEvent".to_string(),
        "end tell".to_string(),
        "return eventId".to_string(),
    ]
}

fn delete_statements(calendar_name: &str, event_ids: &[String]) -> Vec<String> {
    let mut statements = vec![
        "tell application \"Calendar\"".to_string(),
        format!(
            "set targetCalendar to calendar \"{}\"",
            escape(calendar_name)
        ),
        "tell targetCalendar".to_string(),
    ];
    for id in event_ids {
        statements.push("try".to_string());
        statements.push(format!(
            "delete (first event whose uid is \"{}\")",
            escape(id)
        ));
        statements.push("end try".to_string());
    }
    statements.push("end tell".to_string());
    statements.push("end tell".to_string());
    statements
}

fn run_statements(statements: &[String], timeout_secs: u64) -> Result<String, CalendarError> {
    let mut command = Command::new("osascript");
    for statement in statements {
        command.arg("-e").arg(statement);
    }
    debug!("running osascript with {} statement(s)", statements.len());

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        if child.try_wait()?.is_some() {
            break;
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            return Err(CalendarError::Timeout(timeout_secs));
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CalendarError::Script(stderr.trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
