// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Averaging window configuration

use serde::{Deserialize, Serialize};

use crate::measurement::AcquisitionWindow;

/// Initial signal and background windows, in sample indices.
///
/// Both windows are half-open: `signal_start..signal_end` and
/// `background_start..background_end`. Registers 20, 21, 27 and 28 move them
/// at run time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowConfig {
    pub signal_start: usize,
    pub signal_end: usize,
    pub background_start: usize,
    pub background_end: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            signal_start: 4_000,
            signal_end: 6_000,
            background_start: 0,
            background_end: 1_000,
        }
    }
}

impl From<WindowConfig> for AcquisitionWindow {
    fn from(config: WindowConfig) -> Self {
        AcquisitionWindow::new(
            config.signal_start,
            config.signal_end,
            config.background_start,
            config.background_end,
        )
    }
}
