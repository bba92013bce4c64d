// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register engine
//!
//! [`MonitorEngine`] owns every piece of shared state of the monitor: the
//! calibration table, the derived-scalar cache, the channel buffers, the
//! acquisition window, the operating mode and the acquisition state machine.
//! It is the only entry point of the front end and of the Modbus gateway.
//!
//! The boundary methods never fail: errors are logged and replaced by a
//! default value (0 for scalars, an all-zero waveform for waveforms).
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_bpm_monitor::address::Address;
//! use rust_bpm_monitor::board::SimulatedBoard;
//! use rust_bpm_monitor::calibration::CalibrationStore;
//! use rust_bpm_monitor::config::Config;
//! use rust_bpm_monitor::engine::MonitorEngine;
//!
//! let config = Config::default();
//! let engine = MonitorEngine::new(
//!     Arc::new(SimulatedBoard::default()),
//!     Arc::new(CalibrationStore::new()),
//!     &config,
//! );
//!
//! let (samples, timestamp) = engine.extract_waveform(&Address::waveform(11));
//! let average = engine.read_scalar(&Address::register(34, 0));
//! println!("{} samples at {:?}, average {}", samples.len(), timestamp, average);
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::error;
use tokio::sync::broadcast;

use crate::acquisition::{HistoryCapture, Timestamp, TimestampLatch, TriggerPoller};
use crate::address::{Address, AddressKind};
use crate::board::AcquisitionBoard;
use crate::calibration::CalibrationStore;
use crate::config::Config;
use crate::error::{MonitorError, MonitorResult};
use crate::measurement::{
    amp_to_power_calibrated, AcquisitionWindow, CacheEffect, DerivedScalarCache, DerivedValues,
};
use crate::registers::{read_table, write_table, ReadContext, ScalarRead, WriteAction, WriteContext};
use crate::waveform::{BufferId, WaveformExtractor, LIVE_CAPACITY};

/// Owned context of the register engine
pub struct MonitorEngine {
    board: Arc<dyn AcquisitionBoard>,
    calibration: Arc<CalibrationStore>,
    calibration_path: PathBuf,
    derived: DerivedScalarCache,
    extractor: WaveformExtractor,
    reads: HashMap<u16, ScalarRead>,
    writes: HashMap<u16, WriteAction>,
    pulsed: AtomicBool,
    window: RwLock<AcquisitionWindow>,
    latch: Arc<TimestampLatch>,
    poller: Arc<TriggerPoller>,
    history: HistoryCapture,
}

impl MonitorEngine {
    /// Build the engine and its dispatch tables from the configuration
    pub fn new(
        board: Arc<dyn AcquisitionBoard>,
        calibration: Arc<CalibrationStore>,
        config: &Config,
    ) -> Self {
        let acquisition = &config.acquisition;
        let latch = Arc::new(TimestampLatch::new());
        let poller = Arc::new(TriggerPoller::new(
            board.clone(),
            latch.clone(),
            Duration::from_millis(acquisition.poll_interval_ms),
        ));
        let history = HistoryCapture::new(
            board.clone(),
            Duration::from_millis(acquisition.history_timeout_ms),
            Duration::from_millis(acquisition.history_poll_interval_ms),
        );

        Self {
            extractor: WaveformExtractor::new(board.clone()),
            board,
            calibration,
            calibration_path: config.calibration.path.clone(),
            derived: DerivedScalarCache::new(),
            reads: read_table(),
            writes: write_table(),
            pulsed: AtomicBool::new(acquisition.pulsed_mode),
            window: RwLock::new(config.window.into()),
            latch,
            poller,
            history,
        }
    }

    /// Read a scalar register, 0 on any error
    pub fn read_scalar(&self, address: &Address) -> f32 {
        self.try_read_scalar(address).unwrap_or_else(|e| {
            error!("Read of {:?} failed: {}", address, e);
            0.0
        })
    }

    /// Read a scalar register
    ///
    /// `Power` addresses convert the dispatched amplitude to kW with
    /// calibration row `channel + 1`.
    pub fn try_read_scalar(&self, address: &Address) -> MonitorResult<f32> {
        let read = self.scalar_entry(&self.reads, address)?;
        let ctx = ReadContext {
            board: self.board.as_ref(),
            derived: &self.derived,
            pulsed: self.is_pulsed(),
        };
        let value = read.evaluate(address, &ctx)?;

        if address.kind == AddressKind::Power {
            let row = address.channel as usize + 1;
            return Ok(amp_to_power_calibrated(&self.calibration, value, row)? as f32);
        }
        Ok(value)
    }

    /// Write a scalar register, errors are logged and the write dropped
    pub fn write_scalar(&self, address: &Address, value: f32) {
        if let Err(e) = self.try_write_scalar(address, value) {
            error!("Write of {} to {:?} failed: {}", value, address, e);
        }
    }

    /// Write a scalar register
    ///
    /// A history capture request (offset 3) blocks until the record is
    /// complete or the capture times out.
    pub fn try_write_scalar(&self, address: &Address, value: f32) -> MonitorResult<()> {
        let action = self.scalar_entry(&self.writes, address)?;
        let ctx = WriteContext {
            board: self.board.as_ref(),
            calibration: &self.calibration,
            calibration_path: &self.calibration_path,
            pulsed: &self.pulsed,
            window: &self.window,
            history: &self.history,
        };
        action.execute(address, value, &ctx)
    }

    /// Whether a control action is mapped at `address`
    pub fn is_writable(&self, address: &Address) -> bool {
        self.scalar_entry(&self.writes, address).is_ok()
    }

    /// Whether the write at `address` may block the caller
    pub fn write_blocks(&self, address: &Address) -> bool {
        self.scalar_entry(&self.writes, address)
            .map(WriteAction::is_blocking)
            .unwrap_or(false)
    }

    /// Extract a waveform and refresh the derived values it feeds
    ///
    /// Unknown offsets log an error and yield an all-zero waveform of live
    /// capacity. The timestamp is the one of the latest trigger cycle.
    pub fn extract_waveform(&self, address: &Address) -> (Vec<f32>, Timestamp) {
        let samples = match self.extractor.extract(address) {
            Ok(extracted) => {
                self.update_derived_stats(extracted.effect, &extracted.samples);
                extracted.samples
            }
            Err(e) => {
                error!("Extraction of {:?} failed: {}", address, e);
                vec![0.0; LIVE_CAPACITY]
            }
        };
        (samples, self.latch.latest())
    }

    /// Apply `effect` to the derived-scalar cache using the current window
    pub fn update_derived_stats(&self, effect: CacheEffect, samples: &[f32]) {
        let window = self.window();
        if let Err(e) = self.derived.update(effect, samples, &window) {
            error!("Derived value update {:?} failed: {}", effect, e);
        }
    }

    /// Receiver of the trigger-ready notifications
    pub fn subscribe_trigger_ready(&self) -> broadcast::Receiver<Timestamp> {
        self.poller.subscribe()
    }

    /// Receiver of the history-ready notifications
    pub fn subscribe_history_ready(&self) -> broadcast::Receiver<Timestamp> {
        self.history.subscribe()
    }

    pub fn poller(&self) -> Arc<TriggerPoller> {
        self.poller.clone()
    }

    pub fn history(&self) -> &HistoryCapture {
        &self.history
    }

    pub fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }

    pub fn is_pulsed(&self) -> bool {
        self.pulsed.load(Ordering::SeqCst)
    }

    pub fn window(&self) -> AcquisitionWindow {
        *self.window.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn derived_values(&self) -> DerivedValues {
        self.derived.snapshot()
    }

    pub fn latest_timestamp(&self) -> Timestamp {
        self.latch.latest()
    }

    /// Last samples kept for a channel buffer
    pub fn channel_buffer(&self, id: BufferId) -> Option<Vec<f32>> {
        self.extractor.buffer(id)
    }

    fn scalar_entry<T: Copy>(&self, table: &HashMap<u16, T>, address: &Address) -> MonitorResult<T> {
        let invalid = MonitorError::InvalidAddress {
            kind: address.kind,
            offset: address.offset,
        };
        if !address.kind.is_scalar() {
            return Err(invalid);
        }
        table.get(&address.offset).copied().ok_or(invalid)
    }
}
