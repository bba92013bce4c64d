// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Data acquisition configuration
//!
//! This module defines the structures for configuring the trigger poller and
//! the history capture of the monitor.

use serde::{Deserialize, Serialize};

/// Configuration for the acquisition state machine.
///
/// Controls the cadence of the trigger poller, the bounds of the history
/// capture wait and the operating mode at startup.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionConfig {
    /// Flag to enable or disable the trigger poller.
    ///
    /// When disabled no trigger notification is ever published, scalar and
    /// waveform reads keep working on whatever the board holds.
    pub enabled: bool,

    /// Time interval in milliseconds between two trigger polls.
    pub poll_interval_ms: u64,

    /// Maximum time in milliseconds a history capture waits for the board.
    ///
    /// Must not be lower than `history_poll_interval_ms`.
    pub history_timeout_ms: u64,

    /// Interval in milliseconds between two history readiness checks.
    pub history_poll_interval_ms: u64,

    /// Start in pulsed mode instead of CW mode.
    ///
    /// Register 19 switches the mode at run time.
    #[serde(default)]
    pub pulsed_mode: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 100,
            history_timeout_ms: 5000,
            history_poll_interval_ms: 10,
            pulsed_mode: false,
        }
    }
}
