//! Executed raw requests, in completion order.

use serde::Serialize;
use thiserror::Error;

use crate::surface::RequestInput;

pub const SUMMARY_MAX_CHARS: usize = 80;
pub const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history record {ordinal} not found")]
    NotFound { ordinal: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub ordinal: u64,
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl HistoryRecord {
    pub fn summary(&self) -> String {
        summary_line(&self.command)
    }
}

/// One-line label for the selectable history list.
///
/// Takes the first line of `command`; anything longer than
/// [`SUMMARY_MAX_CHARS`] characters is cut so that the label plus
/// [`TRUNCATION_MARKER`] is exactly that long.
pub fn summary_line(command: &str) -> String {
    let first_line = command.lines().next().unwrap_or_default();
    if first_line.chars().count() <= SUMMARY_MAX_CHARS {
        return first_line.to_string();
    }

    let keep = SUMMARY_MAX_CHARS - TRUNCATION_MARKER.chars().count();
    let mut summary = first_line.chars().take(keep).collect::<String>();
    summary.push_str(TRUNCATION_MARKER);
    summary
}

/// Append-only request history. Ordinals start at 1 and are never reused.
///
/// Records are kept for the life of the process with no size cap.
#[derive(Debug, Default)]
pub struct RequestHistory {
    records: Vec<HistoryRecord>,
}

impl RequestHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        command: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: i32,
    ) -> u64 {
        let ordinal = self.records.len() as u64 + 1;
        self.records.push(HistoryRecord {
            ordinal,
            command: command.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        });
        ordinal
    }

    pub fn get(&self, ordinal: u64) -> Result<&HistoryRecord, HistoryError> {
        ordinal
            .checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| self.records.get(index))
            .ok_or(HistoryError::NotFound { ordinal })
    }

    /// Puts the stored command back into the request editor.
    pub fn replay_into(
        &self,
        ordinal: u64,
        input: &mut dyn RequestInput,
    ) -> Result<&HistoryRecord, HistoryError> {
        let record = self.get(ordinal)?;
        input.set_text(&record.command);
        Ok(record)
    }

    pub fn latest(&self) -> Option<&HistoryRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    pub fn summaries(&self) -> impl Iterator<Item = (u64, String)> + '_ {
        self.records
            .iter()
            .map(|record| (record.ordinal, record.summary()))
    }
}
