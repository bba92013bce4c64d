// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Acquisition board configuration
//!
//! Selects the board backend and carries the parameters of the simulated
//! board used for development and testing.

use serde::{Deserialize, Serialize};

use crate::board::faults::FaultConfig;
use crate::board::replay::ReplayConfig;

/// Board backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardKind {
    /// Software board generating pulse-shaped signals
    Simulated,
    /// Vendor low-level library linked at build time (`hardware` feature)
    Hardware,
}

impl std::str::FromStr for BoardKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" => Ok(BoardKind::Simulated),
            "hardware" => Ok(BoardKind::Hardware),
            other => anyhow::bail!("Unknown board kind: {}", other),
        }
    }
}

/// Configuration for the acquisition board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Backend used to talk to the board
    pub kind: BoardKind,

    /// Parameters of the simulated board, ignored by the hardware backend
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            kind: BoardKind::Simulated,
            simulator: SimulatorConfig::default(),
        }
    }
}

/// Distribution of the simulated amplitude noise
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseModel {
    /// Uniform, `noise_level` is the peak-to-peak width
    #[default]
    Uniform,
    /// Gaussian, `noise_level` is the standard deviation
    Gaussian,
}

/// Signal model of the simulated board.
///
/// Every trigger frame is a trapezoidal RF pulse: baseline up to
/// `pulse_start`, a linear rise of `rise_samples`, a flattop, then a linear
/// fall ending at `pulse_end`. Amplitudes are in ADC counts, phases in
/// degrees and positions in µm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulatorConfig {
    /// RNG seed, a random seed is drawn when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Samples per trigger frame
    pub trigger_samples: usize,

    /// Samples per history channel
    pub history_samples: usize,

    /// First sample of the pulse rising edge
    pub pulse_start: usize,

    /// Last sample of the pulse falling edge
    pub pulse_end: usize,

    /// Length of the rising and falling edges
    pub rise_samples: usize,

    /// Flattop amplitude in ADC counts
    pub pulse_amplitude: f32,

    /// Baseline amplitude in ADC counts
    pub baseline_amplitude: f32,

    /// Flattop phase of RF channel 0 in degrees, channel *n* adds `n · 10°`
    pub phase_deg: f32,

    /// Peak-to-peak phase jitter in degrees
    pub phase_jitter_deg: f32,

    /// Amplitude noise, as a fraction of the pulse amplitude
    pub noise_level: f32,

    /// Distribution of the amplitude noise
    pub noise_model: NoiseModel,

    /// Beam position X1, Y1, X2, Y2 during the pulse, in µm
    pub positions_um: [f32; 4],

    /// Electrode voltage reading in ADC counts
    pub electrode_counts: i32,

    /// Polls of the history flag before a capture is reported ready
    pub history_ready_after_polls: u32,

    /// Raw clock ticks added per capture marker latch
    pub ticks_per_poll: u32,

    /// Faults active from start-up
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<FaultConfig>,

    /// Recording replacing the generated RF readings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay: Option<ReplayConfig>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            trigger_samples: 10_000,
            history_samples: 10_000,
            pulse_start: 2_000,
            pulse_end: 8_000,
            rise_samples: 200,
            pulse_amplitude: 20_000.0,
            baseline_amplitude: 50.0,
            phase_deg: 30.0,
            phase_jitter_deg: 0.5,
            noise_level: 0.01,
            noise_model: NoiseModel::Uniform,
            positions_um: [120.0, -80.0, 45.0, 10.0],
            electrode_counts: 1_000_000,
            history_ready_after_polls: 3,
            // 100 ms of 16 ns ticks
            ticks_per_poll: 6_250_000,
            faults: Vec::new(),
            replay: None,
        }
    }
}
