use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use kiroku_core::calendar::WrittenEvent;
use kiroku_core::types::ValidatedTimeBlock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::config::write_atomic;

const LOG_FILE: &str = "time_log.jsonl";
const RECENT_FILE: &str = "recent_batch.json";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history io error: {0}")]
    Io(#[from] io::Error),
    #[error("history serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("history timestamp error: {0}")]
    Time(#[from] time::error::Format),
}

/// One appended log line: the block plus when it was recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub logged_at: String,
    #[serde(flatten)]
    pub block: ValidatedTimeBlock,
}

/// The last written batch, kept so `undo` can delete exactly those events.
/// A single slot; each successful `record` overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentBatch {
    pub batch_id: String,
    pub created_at: String,
    pub events: Vec<WrittenEvent>,
}

pub struct HistoryStore {
    data_dir: PathBuf,
}

impl HistoryStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn log_path(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }

    fn recent_path(&self) -> PathBuf {
        self.data_dir.join(RECENT_FILE)
    }

    /// Append blocks to the log, one JSON object per line.
    pub fn append_blocks(&self, blocks: &[ValidatedTimeBlock]) -> Result<(), HistoryError> {
        if blocks.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.data_dir)?;
        let logged_at = OffsetDateTime::now_utc().format(&Rfc3339)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        for block in blocks {
            let entry = LogEntry {
                logged_at: logged_at.clone(),
                block: block.clone(),
            };
            let line = serde_json::to_string(&entry)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    /// Read log entries, newest last. `date` filters on the block's start
    /// date in `YYYY-MM-DD` form. Malformed lines are skipped.
    pub fn entries(&self, date: Option<&str>) -> Result<Vec<LogEntry>, HistoryError> {
        let path = self.log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(entry) = serde_json::from_str::<LogEntry>(line) else {
                continue;
            };
            if let Some(date) = date
                && entry.block.start_time.date().to_string() != date
            {
                continue;
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn save_recent_batch(&self, events: Vec<WrittenEvent>) -> Result<RecentBatch, HistoryError> {
        fs::create_dir_all(&self.data_dir)?;
        let batch = RecentBatch {
            batch_id: Uuid::now_v7().to_string(),
            created_at: OffsetDateTime::now_utc().format(&Rfc3339)?,
            events,
        };
        let content = serde_json::to_vec_pretty(&batch)?;
        write_atomic(&self.recent_path(), &content)?;
        Ok(batch)
    }

    pub fn load_recent_batch(&self) -> Result<Option<RecentBatch>, HistoryError> {
        let path = self.recent_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn clear_recent_batch(&self) -> Result<(), HistoryError> {
        let path = self.recent_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
