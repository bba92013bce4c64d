// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error types for the register engine
//!
//! Every failure that can occur while resolving an address, reading the
//! calibration table or driving the acquisition state machine is expressed as a
//! [`MonitorError`]. The engine boundary ([`crate::engine::MonitorEngine`])
//! logs these errors and falls back to a default value, so none of them ever
//! reaches the front end as a failure.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::address::{AddressKind, ChannelCategory};

/// Errors produced by the register engine and its components
#[derive(Error, Debug)]
pub enum MonitorError {
    /// No register, waveform or control action is mapped at this offset
    #[error("Unknown {kind:?} address at offset {offset}")]
    InvalidAddress { kind: AddressKind, offset: u16 },

    /// The channel index exceeds the cardinality of its category
    #[error("Channel {channel} out of range for {category:?} (limit {limit})")]
    OutOfRangeChannel {
        channel: u16,
        category: ChannelCategory,
        limit: u16,
    },

    /// The calibration file could not be opened or read
    #[error("Calibration file {path:?} could not be loaded: {reason}")]
    CalibrationFile { path: PathBuf, reason: String },

    /// Calibration cell outside the 9×7 grid
    #[error("Calibration cell ({row}, {col}) is outside the table")]
    CalibrationIndex { row: usize, col: usize },

    /// A history capture is already running
    #[error("History capture already in flight")]
    ConcurrentCaptureRejected,

    /// A history capture was requested with a disabled flag
    #[error("History capture requested with enable = false")]
    CaptureDisabled,

    /// The board did not report readiness before the deadline
    #[error("Board not ready after {0:?}")]
    HardwareTimeout(Duration),

    /// A window bound written through a register is not a valid sample index
    #[error("Invalid window bound {0}")]
    InvalidWindow(f32),

    /// The recording played by the simulated board could not be loaded
    #[error("Replay file {path:?} could not be loaded: {reason}")]
    ReplayFile { path: PathBuf, reason: String },

    /// The configured board backend is not available in this build
    #[error("Board backend '{0}' is not available in this build")]
    UnsupportedBoard(String),
}

/// Convenience alias used throughout the engine
pub type MonitorResult<T> = Result<T, MonitorError>;
