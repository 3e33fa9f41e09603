//! Append-only log of date ranges a backfill could not recover.
//!
//! One line per range: `Missing data: 2005-01-01 to 2005-01-31`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, warn};

use super::artifact::ArtifactError;
use crate::domain::{DateRange, MissingRange};

pub const DEFAULT_LOG_NAME: &str = "missing_data.log";
const PREFIX: &str = "Missing data: ";

/// Render one log line (without trailing newline).
pub fn format_line(range: &DateRange) -> String {
    format!("{PREFIX}{range}")
}

/// Parse one log line back into a range.
pub fn parse_line(line: &str) -> Option<DateRange> {
    let rest = line.trim().strip_prefix(PREFIX)?;
    let (from, to) = rest.split_once(" to ")?;
    let from = NaiveDate::parse_from_str(from.trim(), "%Y-%m-%d").ok()?;
    let to = NaiveDate::parse_from_str(to.trim(), "%Y-%m-%d").ok()?;
    DateRange::new(from, to)
}

pub struct MissingRangeLog {
    path: PathBuf,
}

impl MissingRangeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `{dir}/missing_data.log`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DEFAULT_LOG_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append every range; creates the file (and parent directory) if needed.
    pub fn append(&self, missing: &[MissingRange]) -> Result<(), ArtifactError> {
        if missing.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ArtifactError::io(&self.path, e))?;
        for m in missing {
            writeln!(file, "{}", format_line(&m.range))
                .map_err(|e| ArtifactError::io(&self.path, e))?;
        }
        info!(path = %self.path.display(), ranges = missing.len(), "missing ranges logged");
        Ok(())
    }

    /// Distinct ranges in the log, in first-seen order. A missing file is empty.
    pub fn read(&self) -> Result<Vec<DateRange>, ArtifactError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content =
            fs::read_to_string(&self.path).map_err(|e| ArtifactError::io(&self.path, e))?;

        let mut ranges: Vec<DateRange> = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(line) {
                Some(range) if !ranges.contains(&range) => ranges.push(range),
                Some(_) => {}
                None => warn!(line = lineno + 1, text = line, "skipping unparsable log line"),
            }
        }
        Ok(ranges)
    }

    /// Rewrite the log to hold exactly `missing`, via `<name>.tmp` and a rename.
    /// An empty list removes the log.
    pub fn replace(&self, missing: &[MissingRange]) -> Result<(), ArtifactError> {
        if missing.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path).map_err(|e| ArtifactError::io(&self.path, e))?;
                info!(path = %self.path.display(), "missing-range log cleared");
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
        }

        let body: String = missing
            .iter()
            .map(|m| format_line(&m.range) + "\n")
            .collect();
        let tmp_path = self.path.with_extension("log.tmp");
        fs::write(&tmp_path, body).map_err(|e| ArtifactError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            ArtifactError::io(&self.path, e)
        })?;
        info!(path = %self.path.display(), ranges = missing.len(), "missing-range log rewritten");
        Ok(())
    }
}
