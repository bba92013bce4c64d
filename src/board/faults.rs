// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Fault injection for the simulated board
//!
//! A fault is attached to one RF channel and corrupts everything the board
//! returns for it: the RF snapshot, the amplitude and phase channels of the
//! processed trigger bank, the raw ADC channel and the history channels.
//! Each fault fires with its own probability on every frame read and counts
//! how often it fired.

use std::fmt;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::simulator::{gaussian, wrap_degrees};
use super::RfReading;
use crate::measurement::power::AMPLITUDE_FULL_SCALE;

/// Kind of corruption applied to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultType {
    /// Amplitude and phase read zero
    ChannelDead,
    /// Gaussian noise on the amplitude, `magnitude` is the relative deviation
    Noisy,
    /// Amplitude pinned at `magnitude`, full scale by default
    Saturated,
    /// The channel keeps returning the frame it held when the fault first fired
    Stuck,
    /// Amplitude gain growing by `magnitude` every time the fault fires
    Drift,
    /// A block of `magnitude` times the frame length reads zero
    Dropout,
    /// One amplitude sample multiplied by `magnitude`
    Spike,
    /// Phase shifted by `magnitude` degrees
    PhaseJump,
    /// Every sample is NaN
    InvalidData,
}

impl FaultType {
    pub const ALL: [FaultType; 9] = [
        FaultType::ChannelDead,
        FaultType::Noisy,
        FaultType::Saturated,
        FaultType::Stuck,
        FaultType::Drift,
        FaultType::Dropout,
        FaultType::Spike,
        FaultType::PhaseJump,
        FaultType::InvalidData,
    ];

    /// Magnitude used when the configuration leaves it out
    pub fn default_magnitude(self) -> f32 {
        match self {
            FaultType::Noisy => 0.5,
            FaultType::Saturated => AMPLITUDE_FULL_SCALE,
            FaultType::Drift => 0.2,
            FaultType::Dropout => 0.1,
            FaultType::Spike => 5.0,
            FaultType::PhaseJump => 180.0,
            FaultType::ChannelDead | FaultType::Stuck | FaultType::InvalidData => 0.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FaultType::ChannelDead => "channel_dead",
            FaultType::Noisy => "noisy",
            FaultType::Saturated => "saturated",
            FaultType::Stuck => "stuck",
            FaultType::Drift => "drift",
            FaultType::Dropout => "dropout",
            FaultType::Spike => "spike",
            FaultType::PhaseJump => "phase_jump",
            FaultType::InvalidData => "invalid_data",
        }
    }
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for FaultType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        FaultType::ALL
            .into_iter()
            .find(|fault| fault.name() == wanted)
            .ok_or_else(|| anyhow::anyhow!("Unknown fault type: {}", s))
    }
}

/// Which half of an RF channel a frame carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalRole {
    Amplitude,
    Phase,
}

fn default_probability() -> f64 {
    1.0
}

/// One fault attached to an RF channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// RF channel, 0 to 7
    pub channel: usize,

    pub fault: FaultType,

    /// Chance of firing on each frame read, in [0, 1]
    #[serde(default = "default_probability")]
    pub probability: f64,

    /// Strength of the fault, [`FaultType::default_magnitude`] when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f32>,
}

impl FaultConfig {
    /// A fault firing on every frame with its default magnitude
    pub fn new(channel: usize, fault: FaultType) -> Self {
        Self {
            channel,
            fault,
            probability: default_probability(),
            magnitude: None,
        }
    }

    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }

    pub fn with_magnitude(mut self, magnitude: f32) -> Self {
        self.magnitude = Some(magnitude);
        self
    }

    pub fn magnitude(&self) -> f32 {
        self.magnitude
            .unwrap_or_else(|| self.fault.default_magnitude())
    }

    /// Draw whether the fault fires on this frame
    pub(crate) fn fires(&self, rng: &mut StdRng) -> bool {
        if self.probability >= 1.0 {
            true
        } else if self.probability > 0.0 {
            rng.random_bool(self.probability)
        } else {
            false
        }
    }

    /// Corrupt one frame in place.
    ///
    /// `triggers` counts the firings of this fault, the current one included.
    /// [`FaultType::Stuck`] needs the frame history and is handled by the
    /// board.
    pub(crate) fn apply_samples(
        &self,
        role: SignalRole,
        samples: &mut [f32],
        rng: &mut StdRng,
        triggers: u64,
    ) {
        let magnitude = self.magnitude();
        match (self.fault, role) {
            (FaultType::ChannelDead, _) => samples.fill(0.0),
            (FaultType::InvalidData, _) => samples.fill(f32::NAN),
            (FaultType::Noisy, SignalRole::Amplitude) => {
                for sample in samples.iter_mut() {
                    *sample *= 1.0 + gaussian(rng) * magnitude;
                }
            }
            (FaultType::Saturated, SignalRole::Amplitude) => samples.fill(magnitude),
            (FaultType::Drift, SignalRole::Amplitude) => {
                let gain = 1.0 + magnitude * triggers as f32;
                samples.iter_mut().for_each(|sample| *sample *= gain);
            }
            (FaultType::Dropout, _) if !samples.is_empty() => {
                let len = samples.len();
                let width = ((len as f32 * magnitude) as usize).clamp(1, len);
                let start = rng.random_range(0..=len - width);
                samples[start..start + width].fill(0.0);
            }
            (FaultType::Spike, SignalRole::Amplitude) if !samples.is_empty() => {
                let index = rng.random_range(0..samples.len());
                samples[index] *= magnitude;
            }
            (FaultType::PhaseJump, SignalRole::Phase) => {
                for sample in samples.iter_mut() {
                    *sample = wrap_degrees(*sample + magnitude);
                }
            }
            _ => {}
        }
    }

    /// Corrupt an RF snapshot, a one-sample frame of each role
    pub(crate) fn apply_reading(&self, reading: &mut RfReading, rng: &mut StdRng, triggers: u64) {
        let mut amplitude = [reading.amplitude];
        let mut phase = [reading.phase];
        self.apply_samples(SignalRole::Amplitude, &mut amplitude, rng, triggers);
        self.apply_samples(SignalRole::Phase, &mut phase, rng, triggers);
        reading.amplitude = amplitude[0];
        reading.phase = phase[0];
    }
}

/// Firing count of one active fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaultStatistic {
    pub channel: usize,
    pub fault: FaultType,
    pub triggers: u64,
}
