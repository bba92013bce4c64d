// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Acquisition board abstraction
//!
//! This module defines the capability interface of the measurement board and
//! its backends:
//! - Simulated: pulse-shaped signals with seeded noise for development and
//!   tests, with fault injection and playback of recorded RF data
//! - Hardware: the vendor low-level library, linked when the `hardware` feature
//!   is enabled
//!
//! Board calls are infallible by contract. Channel indices are validated by
//! the engine before any call reaches the board.

pub mod faults;
#[cfg(feature = "hardware")]
pub mod hardware;
pub mod replay;
pub mod simulator;

use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::board::{BoardConfig, BoardKind};
use crate::error::MonitorResult;

#[cfg(feature = "hardware")]
pub use hardware::HardwareBoard;
pub use faults::{FaultConfig, FaultStatistic, FaultType};
pub use replay::{ReplayConfig, ReplayFrame, ReplaySource};
pub use simulator::{SimulatedBoard, SimulatorStats};

/// Instantaneous RF reading of one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RfReading {
    /// Amplitude in ADC counts
    pub amplitude: f32,
    /// Phase in degrees
    pub phase: f32,
}

/// Bank selector of the trigger frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerBank {
    /// Raw ADC samples, channels 0 to 7
    Adc,
    /// Processed IQ data: amplitude/phase pairs on channels 0 to 15, positions on
    /// 16 to 19 and diagnostics on 20 and 21
    Processed,
}

impl TriggerBank {
    /// Selector value understood by the board library
    pub fn selector(self) -> i32 {
        match self {
            TriggerBank::Adc => 0,
            TriggerBank::Processed => 1,
        }
    }
}

/// Raw White-Rabbit time of the last capture marker.
///
/// `tai_seconds` counts from the TAI epoch, `tai_ticks` are 16 ns ticks within
/// the second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTimestamp {
    pub tai_seconds: i64,
    pub tai_ticks: u32,
}

/// Capability interface of the measurement board
#[cfg_attr(test, mockall::automock)]
pub trait AcquisitionBoard: Send + Sync {
    /// Bring the board up, called once before anything else
    fn initialize(&self);

    /// Amplitude and phase snapshot of an RF channel
    fn rf_snapshot(&self, channel: usize) -> RfReading;

    /// One trigger frame channel, at most 10 000 samples
    fn raw_waveform(&self, bank: TriggerBank, channel: usize) -> Vec<f32>;

    /// One history channel, at most 100 000 samples
    fn history_waveform(&self, channel: usize) -> Vec<f32>;

    /// Time of the last latched capture marker
    fn raw_timestamp(&self) -> RawTimestamp;

    /// True once a complete trigger frame is available
    fn is_trigger_data_ready(&self) -> bool;

    /// True once the history channels of the last capture are uploaded.
    ///
    /// Polled by the capture loop against its deadline, so it must answer
    /// without waiting for the record.
    fn is_history_data_ready(&self) -> bool;

    /// Arm the history capture
    fn start_history_capture(&self);

    /// Latch the timestamp of the current trigger frame
    fn latch_capture_marker(&self);

    /// Storage-ready flag of the history memory
    fn history_storage_ready(&self) -> i32;

    fn reset_history_storage(&self, value: i32);

    fn digital_input(&self, channel: usize) -> i32;

    fn set_digital_output(&self, channel: usize, value: i32);

    /// Readback of FPGA LED 0 or 1
    fn fpga_led(&self, led: usize) -> i32;

    fn set_system_led_enable(&self, value: i32);

    fn set_fan_led_state(&self, value: i32);

    /// Enable the pulsed RF output, 0 selects CW
    fn set_pulse_output_enable(&self, value: u16);

    /// Internal (1) or external (0) trigger for trigger frames
    fn set_internal_trigger_enable(&self, value: i32);

    fn select_trigger_source(&self, value: i32);

    fn set_trigger_extract_ratio(&self, ratio: f32);

    fn set_history_extract_ratio(&self, ratio: f32);

    fn set_iq_start_sync(&self, value: i32);

    /// Voltage of one pickup electrode in ADC counts
    fn electrode_voltage(&self, channel: usize) -> i32;

    fn electrode_sum(&self, channel: usize) -> i32;

    /// BPM phase computed by the FPGA in degrees
    fn bpm_phase(&self, channel: usize) -> f32;

    /// XY position computed by the FPGA in nm
    fn xy_position(&self, channel: usize) -> i32;

    fn xy_protect_status(&self, channel: usize) -> i32;

    fn sum_protect_status(&self, channel: usize) -> i32;

    fn adc_clock_state(&self) -> i32;

    fn white_rabbit_status(&self, channel: usize) -> i32;

    fn set_bpm_k1(&self, channel: usize, value: f32);

    fn set_bpm_k2(&self, channel: usize, value: f32);

    fn set_bpm_k3(&self, channel: usize, value: f32);

    fn set_bpm_phase_offset(&self, channel: usize, value: f32);

    fn set_bpm_kxy(&self, channel: usize, value: i32);

    fn set_bpm_xy_offset(&self, channel: usize, value: i32);

    fn set_bpm_xy_limit(&self, channel: usize, value: i32);

    fn set_bpm_sum_limit(&self, channel: usize, value: i32);

    /// Fast interlock filter time in µs
    fn set_protect_filter_time(&self, micros: f32);

    fn set_dds_frequency_word(&self, value: i32);

    fn reset_board(&self, value: i32);
}

/// Create the board backend selected by the configuration
///
/// ### Errors
///
/// [`crate::error::MonitorError::UnsupportedBoard`] when the hardware backend is requested
/// from a build without the `hardware` feature.
pub fn create_board(config: &BoardConfig) -> MonitorResult<Arc<dyn AcquisitionBoard>> {
    let board: Arc<dyn AcquisitionBoard> = match config.kind {
        BoardKind::Simulated => {
            let board = SimulatedBoard::new(config.simulator.clone());
            if let Some(replay) = &config.simulator.replay {
                board.set_replay(Some(ReplaySource::from_config(replay)?));
            }
            Arc::new(board)
        }
        #[cfg(feature = "hardware")]
        BoardKind::Hardware => Arc::new(HardwareBoard::new()),
        #[cfg(not(feature = "hardware"))]
        BoardKind::Hardware => {
            return Err(crate::error::MonitorError::UnsupportedBoard(
                "hardware".to_string(),
            ));
        }
    };
    info!("Initializing {:?} acquisition board", config.kind);
    board.initialize();
    Ok(board)
}
