// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Windowed averaging with background subtraction
//!
//! A pulse waveform is reduced to a single voltage by averaging the samples of
//! the signal window (the pulse flattop) and subtracting the mean of the
//! background window (the baseline before the pulse).

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Sample-index bounds of the signal and background windows.
///
/// Both windows are half-open ranges `[start, end)`, so `start == end` is an
/// empty window. `signal_end` itself is the first sample after the signal
/// window: it is not averaged, and it is the sample the flattop phase is
/// frozen from (see [`super::DerivedScalarCache::update`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcquisitionWindow {
    pub signal_start: usize,
    pub signal_end: usize,
    pub background_start: usize,
    pub background_end: usize,
}

impl AcquisitionWindow {
    pub fn new(
        signal_start: usize,
        signal_end: usize,
        background_start: usize,
        background_end: usize,
    ) -> Self {
        Self {
            signal_start,
            signal_end,
            background_start,
            background_end,
        }
    }

    pub fn signal(&self) -> Range<usize> {
        self.signal_start..self.signal_end
    }

    pub fn background(&self) -> Range<usize> {
        self.background_start..self.background_end
    }
}

/// Mean of `samples` over `range`, truncated to the sample length.
///
/// Returns `None` when the effective range is empty.
pub fn window_mean(samples: &[f32], range: Range<usize>) -> Option<f32> {
    let end = range.end.min(samples.len());
    if range.start >= end {
        return None;
    }
    let window = &samples[range.start..end];
    let sum: f64 = window.iter().map(|&s| s as f64).sum();
    Some((sum / window.len() as f64) as f32)
}

/// Signal mean minus background mean; zero if either window is empty
pub fn background_subtracted_average(samples: &[f32], window: &AcquisitionWindow) -> f32 {
    match (
        window_mean(samples, window.signal()),
        window_mean(samples, window.background()),
    ) {
        (Some(signal), Some(background)) => signal - background,
        _ => 0.0,
    }
}
