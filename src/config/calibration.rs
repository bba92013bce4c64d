// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Calibration file configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Location of the calibration table.
///
/// The same path is used by the reload register (offset 9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Path of the comma-delimited calibration table
    pub path: PathBuf,

    /// Load the table when the daemon starts
    pub load_on_startup: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("parameter/llrfparameters.csv"),
            load_on_startup: true,
        }
    }
}
