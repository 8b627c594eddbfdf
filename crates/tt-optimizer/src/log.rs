//! Append-only CSV trial log and its reader.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tt_types::{LogError, METRIC_COLUMNS};

use crate::trial::Trial;

pub const SCORE_COLUMN: &str = "score";
pub const OUTCOME_COLUMN: &str = "outcome";

/// Header for a log over the given parameters.
pub fn log_header<'a>(parameter_names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    parameter_names
        .into_iter()
        .chain(METRIC_COLUMNS)
        .chain([SCORE_COLUMN, OUTCOME_COLUMN])
        .map(str::to_string)
        .collect()
}

/// Durable, row-per-trial CSV writer.
///
/// Each row is encoded on its own, written and synced before `append`
/// returns, so a crash loses at most the trial in flight. A row that fails
/// to reach disk is cut back off the file; committed rows are never
/// rewritten.
#[derive(Debug)]
pub struct TrialLogger {
    path: PathBuf,
    parameters: Vec<String>,
    file: File,
    /// Bytes known to be on disk.
    committed: u64,
    rows: usize,
}

impl TrialLogger {
    /// Create (or truncate) the log and write the fixed header.
    pub fn create<'a>(
        path: impl AsRef<Path>,
        parameter_names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let parameters: Vec<String> = parameter_names.into_iter().map(str::to_string).collect();
        let file = File::create(&path)?;
        let mut logger = Self {
            file,
            path,
            parameters,
            committed: 0,
            rows: 0,
        };

        let header = encode_record(&log_header(logger.parameters.iter().map(String::as_str)))?;
        logger.commit(&header)?;
        debug!("Trial log created at {}", logger.path.display());
        Ok(logger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows written so far (header excluded).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Write one row for `trial` and push it to disk.
    pub fn append(&mut self, trial: &Trial) -> Result<(), LogError> {
        let names: Vec<&str> = trial.parameters.names().collect();
        if names != self.parameters.iter().map(String::as_str).collect::<Vec<_>>() {
            return Err(LogError::ColumnMismatch {
                expected: self.parameters.clone(),
                actual: names.into_iter().map(str::to_string).collect(),
            });
        }

        let mut record: Vec<String> = trial.parameters.values().map(|v| v.to_string()).collect();
        match trial.outcome.metrics() {
            Some(m) => record.extend([
                m.depth_ev.to_string(),
                m.offset_mm.to_string(),
                m.power_mw.to_string(),
            ]),
            None => record.extend(std::iter::repeat(String::new()).take(METRIC_COLUMNS.len())),
        }
        record.push(trial.score.to_string());
        record.push(trial.outcome.label().to_string());

        let bytes = encode_record(&record)?;
        self.commit(&bytes)?;
        self.rows += 1;
        Ok(())
    }

    /// Write and sync `bytes`, or leave the file at its committed length.
    fn commit(&mut self, bytes: &[u8]) -> Result<(), LogError> {
        let written = self
            .file
            .write_all(bytes)
            .and_then(|_| self.file.sync_data());
        if let Err(e) = written {
            let restored = self
                .file
                .set_len(self.committed)
                .and_then(|_| self.file.seek(SeekFrom::Start(self.committed)));
            if let Err(restore) = restored {
                warn!(
                    "Could not trim partial row from {}: {}",
                    self.path.display(),
                    restore
                );
            }
            return Err(e.into());
        }
        self.committed += bytes.len() as u64;
        Ok(())
    }
}

/// One CSV record, terminated, as a standalone byte string.
fn encode_record(record: &[String]) -> Result<Vec<u8>, LogError> {
    let write_error = |message: String| LogError::Write { message };
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(record)
        .map_err(|e| write_error(e.to_string()))?;
    writer
        .into_inner()
        .map_err(|e| write_error(e.to_string()))
}

/// Per-column summary statistics over the numeric cells of a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub name: String,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// A trial log read back into memory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrialLogTable {
    pub headers: Vec<String>,
    /// Numeric cells; `None` for blank or non-numeric cells.
    pub rows: Vec<Vec<Option<f64>>>,
    /// The `outcome` column, when present.
    pub outcomes: Vec<Option<String>>,
}

impl TrialLogTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn column(&self, name: &str) -> Result<Vec<Option<f64>>, LogError> {
        let idx = self.column_index(name).ok_or_else(|| LogError::MissingColumn {
            name: name.to_string(),
        })?;
        Ok(self.rows.iter().map(|r| r.get(idx).copied().flatten()).collect())
    }

    /// Index of the row with the lowest score; the earliest row wins ties.
    pub fn best_row(&self) -> Result<Option<usize>, LogError> {
        let scores = self.column(SCORE_COLUMN)?;
        let mut best: Option<(usize, f64)> = None;
        for (i, score) in scores.into_iter().enumerate() {
            if let Some(s) = score {
                if best.map_or(true, |(_, b)| s < b) {
                    best = Some((i, s));
                }
            }
        }
        Ok(best.map(|(i, _)| i))
    }

    /// Stats for every column that holds at least one number.
    pub fn column_stats(&self) -> Vec<ColumnStats> {
        self.headers
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| {
                let values: Vec<f64> = self
                    .rows
                    .iter()
                    .filter_map(|r| r.get(idx).copied().flatten())
                    .collect();
                if values.is_empty() {
                    return None;
                }
                let count = values.len();
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mean = values.iter().sum::<f64>() / count as f64;
                Some(ColumnStats {
                    name: name.clone(),
                    count,
                    min,
                    max,
                    mean,
                })
            })
            .collect()
    }
}

/// Read a trial log written by [`TrialLogger`] (or any CSV with a header).
pub fn read_trial_log(path: impl AsRef<Path>) -> Result<TrialLogTable, LogError> {
    let path = path.as_ref();
    let read_error = |e: csv::Error| LogError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(read_error)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(read_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let outcome_idx = headers.iter().position(|h| h == OUTCOME_COLUMN);

    let mut table = TrialLogTable {
        headers,
        ..Default::default()
    };
    for record in reader.records() {
        let record = record.map_err(read_error)?;
        table.rows.push(
            record
                .iter()
                .map(|cell| cell.trim().parse::<f64>().ok())
                .collect(),
        );
        table.outcomes.push(
            outcome_idx
                .and_then(|i| record.get(i))
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }
    Ok(table)
}
