// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Amplitude to power conversion and unit scale factors

use crate::calibration::{
    CalibrationStore, INTERCEPT_COLUMN, POWER_OFFSET_COLUMN, SLOPE_COLUMN,
};
use crate::error::MonitorResult;

/// Full scale of the ADC amplitude reading
pub const AMPLITUDE_FULL_SCALE: f32 = 32767.0;

/// ADC counts per volt of the amplitude channels
pub const COUNTS_PER_VOLT: f64 = 1.28e6;

/// Convert ADC counts to Vrms: `counts / 1.28e6 · √2`
pub fn counts_to_vrms(counts: f32) -> f32 {
    ((counts as f64 / COUNTS_PER_VOLT) * std::f64::consts::SQRT_2) as f32
}

/// Convert a position sample from µm to mm
pub fn microns_to_mm(value: f32) -> f32 {
    value / 1000.0
}

/// Power in kW from a calibrated amplitude.
///
/// The amplitude is clamped to `[0, 32767]` first, a NaN amplitude counts as
/// 0, then `Vrms = a·amp − b`, `dBm = 10·log10(Vrms²·20) + offset` and
/// `P = 10^(dBm/10 − 6)`.
pub fn amp_to_power(amplitude: f32, offset: f64, a: f64, b: f64) -> f64 {
    let amplitude = if amplitude.is_nan() || amplitude <= 0.0 {
        0.0
    } else if amplitude >= AMPLITUDE_FULL_SCALE {
        AMPLITUDE_FULL_SCALE
    } else {
        amplitude
    };
    let vrms = a * amplitude as f64 - b;
    let dbm = 10.0 * (vrms * vrms * 20.0).log10() + offset;
    10f64.powf(dbm / 10.0 - 6.0)
}

/// [`amp_to_power`] with the constants of calibration `row`
pub fn amp_to_power_calibrated(
    calibration: &CalibrationStore,
    amplitude: f32,
    row: usize,
) -> MonitorResult<f64> {
    let offset = calibration.get(row, POWER_OFFSET_COLUMN)?;
    let a = calibration.get(row, SLOPE_COLUMN)?;
    let b = calibration.get(row, INTERCEPT_COLUMN)?;
    Ok(amp_to_power(amplitude, offset, a, b))
}
