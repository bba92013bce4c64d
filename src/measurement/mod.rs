// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Derived measurements
//!
//! - `averaging`: signal/background window means
//! - `derived`: cache of values computed during waveform extraction
//! - `power`: unit scale factors and the calibrated amplitude → power chain

pub mod averaging;
pub mod derived;
pub mod power;

pub use averaging::{background_subtracted_average, window_mean, AcquisitionWindow};
pub use derived::{CacheEffect, DerivedScalarCache, DerivedValues};
pub use power::{amp_to_power, amp_to_power_calibrated, counts_to_vrms, microns_to_mm};
