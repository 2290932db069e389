//! Trial history: JSONL append-only persistence of search trials.
//!
//! Persists one JSON object per trial, in trial order. Each line is
//! independent, making the format resilient to partial writes and easy to
//! stream when comparing searches across suppliers.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::search::TrialRecord;

/// A single history line: the trial plus when and for whom it ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub supplier: Option<String>,
    pub recorded_at: chrono::NaiveDateTime,
    pub trial: TrialRecord,
}

/// JSONL history file manager.
#[derive(Debug, Clone)]
pub struct TrialHistory {
    path: PathBuf,
    supplier: Option<String>,
}

impl TrialHistory {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            supplier: None,
        }
    }

    /// Tag every appended entry with a supplier id.
    pub fn for_supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = Some(supplier.into());
        self
    }

    /// Append one trial.
    pub fn append(&self, trial: &TrialRecord) -> io::Result<()> {
        let entry = HistoryEntry {
            supplier: self.supplier.clone(),
            recorded_at: chrono::Local::now().naive_local(),
            trial: trial.clone(),
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "{json}")?;
        file.flush()
    }

    /// Read all entries from the history file.
    ///
    /// Skips malformed lines.
    pub fn read_all(&self) -> io::Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut entries = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(line = n + 1, error = %e, "skipping malformed history line"),
            }
        }
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
