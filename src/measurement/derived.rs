// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Derived-scalar cache
//!
//! Values computed while extracting waveforms and later served by scalar
//! reads: the phase frozen at the end of the flattop, the background-subtracted
//! average voltage and the averaged beam position.

use std::sync::RwLock;

use log::debug;

use super::averaging::{background_subtracted_average, window_mean, AcquisitionWindow};
use crate::address::{ChannelCategory, POSITION_CHANNELS, RF_CHANNELS};
use crate::error::MonitorResult;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedValues {
    pub flattop_phase: [f32; RF_CHANNELS as usize],
    pub average_voltage: [f32; RF_CHANNELS as usize],
    pub average_position: [f32; POSITION_CHANNELS as usize],
}

/// Which cache entry a waveform updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEffect {
    None,
    AverageVoltage(usize),
    FlattopPhase(usize),
    AveragePosition(usize),
}

#[derive(Debug, Default)]
pub struct DerivedScalarCache {
    values: RwLock<DerivedValues>,
}

impl DerivedScalarCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DerivedValues {
        *self.values.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn flattop_phase(&self, rf_channel: usize) -> MonitorResult<f32> {
        let ch = ChannelCategory::Rf.validate(rf_channel as u16)?;
        Ok(self.snapshot().flattop_phase[ch])
    }

    pub fn average_voltage(&self, rf_channel: usize) -> MonitorResult<f32> {
        let ch = ChannelCategory::Rf.validate(rf_channel as u16)?;
        Ok(self.snapshot().average_voltage[ch])
    }

    pub fn average_position(&self, position_channel: usize) -> MonitorResult<f32> {
        let ch = ChannelCategory::Position.validate(position_channel as u16)?;
        Ok(self.snapshot().average_position[ch])
    }

    /// Store `value` in the entry selected by `effect`
    pub fn store(&self, effect: CacheEffect, value: f32) -> MonitorResult<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        match effect {
            CacheEffect::None => {}
            CacheEffect::AverageVoltage(ch) => {
                let ch = ChannelCategory::Rf.validate(ch as u16)?;
                values.average_voltage[ch] = value;
            }
            CacheEffect::FlattopPhase(ch) => {
                let ch = ChannelCategory::Rf.validate(ch as u16)?;
                values.flattop_phase[ch] = value;
            }
            CacheEffect::AveragePosition(ch) => {
                let ch = ChannelCategory::Position.validate(ch as u16)?;
                values.average_position[ch] = value;
            }
        }
        Ok(())
    }

    /// Compute the value `effect` asks for from `samples` and store it.
    ///
    /// - average voltage: signal mean minus background mean
    /// - flattop phase: the sample at `signal_end`, which is the first sample
    ///   past the half-open signal window, left unchanged when the waveform is
    ///   shorter
    /// - average position: signal window mean, zero for an empty window
    pub fn update(
        &self,
        effect: CacheEffect,
        samples: &[f32],
        window: &AcquisitionWindow,
    ) -> MonitorResult<()> {
        let value = match effect {
            CacheEffect::None => return Ok(()),
            CacheEffect::AverageVoltage(_) => background_subtracted_average(samples, window),
            CacheEffect::FlattopPhase(_) => match samples.get(window.signal_end) {
                Some(&phase) => phase,
                None => {
                    debug!(
                        "Flattop index {} past waveform end ({} samples), keeping {:?}",
                        window.signal_end,
                        samples.len(),
                        effect
                    );
                    return Ok(());
                }
            },
            CacheEffect::AveragePosition(_) => {
                window_mean(samples, window.signal()).unwrap_or(0.0)
            }
        };
        self.store(effect, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_read() {
        let cache = DerivedScalarCache::new();
        cache.store(CacheEffect::AverageVoltage(3), 1.5).unwrap();
        cache.store(CacheEffect::FlattopPhase(7), -42.0).unwrap();
        cache.store(CacheEffect::AveragePosition(2), 0.125).unwrap();
        cache.store(CacheEffect::None, 99.0).unwrap();

        assert_eq!(cache.average_voltage(3).unwrap(), 1.5);
        assert_eq!(cache.flattop_phase(7).unwrap(), -42.0);
        assert_eq!(cache.average_position(2).unwrap(), 0.125);
        assert_eq!(cache.average_voltage(0).unwrap(), 0.0);
    }

    #[test]
    fn test_update_from_waveform() {
        let cache = DerivedScalarCache::new();
        let window = AcquisitionWindow::new(4, 8, 0, 2);
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();

        cache
            .update(CacheEffect::AverageVoltage(0), &samples, &window)
            .unwrap();
        // mean(4..8) - mean(0..2) = 5.5 - 0.5
        assert_eq!(cache.average_voltage(0).unwrap(), 5.0);

        cache
            .update(CacheEffect::FlattopPhase(1), &samples, &window)
            .unwrap();
        assert_eq!(cache.flattop_phase(1).unwrap(), 8.0);

        cache
            .update(CacheEffect::AveragePosition(0), &samples, &window)
            .unwrap();
        assert_eq!(cache.average_position(0).unwrap(), 5.5);
    }

    #[test]
    fn test_flattop_sample_sits_after_signal_window() {
        let cache = DerivedScalarCache::new();
        let window = AcquisitionWindow::new(2, 5, 0, 2);
        let mut samples = vec![0.0f32; 8];
        samples[2..5].fill(3.0);
        samples[5] = 90.0;

        cache
            .update(CacheEffect::FlattopPhase(0), &samples, &window)
            .unwrap();
        assert_eq!(cache.flattop_phase(0).unwrap(), 90.0);

        // The frozen sample is not part of the averaged window
        cache
            .update(CacheEffect::AverageVoltage(0), &samples, &window)
            .unwrap();
        assert_eq!(cache.average_voltage(0).unwrap(), 3.0);
        cache
            .update(CacheEffect::AveragePosition(1), &samples, &window)
            .unwrap();
        assert_eq!(cache.average_position(1).unwrap(), 3.0);
    }

    #[test]
    fn test_flattop_past_end_keeps_value() {
        let cache = DerivedScalarCache::new();
        cache.store(CacheEffect::FlattopPhase(2), 12.5).unwrap();

        let window = AcquisitionWindow::new(0, 100, 0, 0);
        cache
            .update(CacheEffect::FlattopPhase(2), &[1.0; 50], &window)
            .unwrap();
        assert_eq!(cache.flattop_phase(2).unwrap(), 12.5);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let cache = DerivedScalarCache::new();
        assert!(cache.store(CacheEffect::AveragePosition(4), 1.0).is_err());
        assert!(cache.flattop_phase(8).is_err());
        assert_eq!(cache.snapshot(), DerivedValues::default());
    }
}
