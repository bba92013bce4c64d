// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Calibration store
//!
//! Per-channel calibration constants live in a 9 × 7 table of `f64`. Row 0 is
//! the board row, rows 1 to 8 belong to RF channels 0 to 7. The columns used by
//! the engine are:
//!
//! | Column | Meaning |
//! |--------|---------|
//! | 1 | power offset in dB (reserved on load, set through register 8) |
//! | 2 | slope `a` of the amplitude → Vrms calibration |
//! | 3 | intercept `b` of the amplitude → Vrms calibration |
//! | 5 | reserved |
//!
//! The table is loaded from a comma-delimited text file without header where
//! line *i* fills row *i* and field *j* fills column *j*. Reserved columns are
//! never overwritten by a load.

use std::fs::File;
use std::path::Path;
use std::sync::RwLock;

use log::{debug, info, warn};

use crate::error::{MonitorError, MonitorResult};

/// Number of calibration rows
pub const CALIBRATION_ROWS: usize = 9;

/// Number of calibration columns
pub const CALIBRATION_COLUMNS: usize = 7;

/// Columns skipped while loading a file
pub const RESERVED_COLUMNS: [usize; 2] = [1, 5];

/// Column holding the power offset
pub const POWER_OFFSET_COLUMN: usize = 1;

/// Column holding the slope of the Vrms calibration
pub const SLOPE_COLUMN: usize = 2;

/// Column holding the intercept of the Vrms calibration
pub const INTERCEPT_COLUMN: usize = 3;

/// Raw calibration grid
pub type CalibrationTable = [[f64; CALIBRATION_COLUMNS]; CALIBRATION_ROWS];

/// Thread-safe owner of the calibration table
#[derive(Debug)]
pub struct CalibrationStore {
    table: RwLock<CalibrationTable>,
}

impl Default for CalibrationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationStore {
    /// Create a store with an all-zero table
    pub fn new() -> Self {
        Self::with_table([[0.0; CALIBRATION_COLUMNS]; CALIBRATION_ROWS])
    }

    /// Create a store pre-filled with `table`
    pub fn with_table(table: CalibrationTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    /// Load the table from a delimited text file.
    ///
    /// Malformed rows are skipped and keep their previous values. If the file
    /// cannot be opened the current table stays untouched and
    /// [`MonitorError::CalibrationFile`] is returned.
    ///
    /// Returns the number of rows that were applied.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> MonitorResult<usize> {
        let path = path.as_ref();
        debug!("Loading calibration table from {:?}", path);

        let file = File::open(path).map_err(|e| MonitorError::CalibrationFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        // Parsed off-lock, applied cell by cell so concurrent writes to the
        // reserved columns are never overwritten
        let mut parsed: Vec<(usize, Vec<(usize, f64)>)> = Vec::with_capacity(CALIBRATION_ROWS);

        for (row, record) in reader.records().enumerate() {
            if row >= CALIBRATION_ROWS {
                warn!(
                    "Calibration file {:?} has more than {} rows, ignoring the rest",
                    path, CALIBRATION_ROWS
                );
                break;
            }

            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping unreadable calibration row {}: {}", row, e);
                    continue;
                }
            };

            match parse_row(&record) {
                Some(values) => parsed.push((row, values)),
                None => warn!("Skipping malformed calibration row {}: {:?}", row, record),
            }
        }

        let applied = parsed.len();
        let table = {
            let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
            for (row, values) in parsed {
                for (col, value) in values {
                    table[row][col] = value;
                }
            }
            *table
        };
        info!(
            "Calibration table loaded from {:?} ({} rows applied)",
            path, applied
        );
        for (row, values) in table.iter().enumerate() {
            debug!("calibration[{}] = {:?}", row, values);
        }

        Ok(applied)
    }

    /// Read one calibration cell
    pub fn get(&self, row: usize, col: usize) -> MonitorResult<f64> {
        check_cell(row, col)?;
        Ok(self.table.read().unwrap_or_else(|e| e.into_inner())[row][col])
    }

    /// Overwrite one calibration cell
    pub fn set(&self, row: usize, col: usize, value: f64) -> MonitorResult<()> {
        check_cell(row, col)?;
        self.table.write().unwrap_or_else(|e| e.into_inner())[row][col] = value;
        Ok(())
    }

    /// Copy of the whole table
    pub fn snapshot(&self) -> CalibrationTable {
        *self.table.read().unwrap_or_else(|e| e.into_inner())
    }
}

fn check_cell(row: usize, col: usize) -> MonitorResult<()> {
    if row < CALIBRATION_ROWS && col < CALIBRATION_COLUMNS {
        Ok(())
    } else {
        Err(MonitorError::CalibrationIndex { row, col })
    }
}

/// Parse the loadable cells of one record, `None` if any of them is not a float
fn parse_row(record: &csv::StringRecord) -> Option<Vec<(usize, f64)>> {
    let mut values = Vec::with_capacity(CALIBRATION_COLUMNS);
    for (col, field) in record.iter().enumerate().take(CALIBRATION_COLUMNS) {
        if RESERVED_COLUMNS.contains(&col) {
            continue;
        }
        values.push((col, field.parse::<f64>().ok()?));
    }
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}
