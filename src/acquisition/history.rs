// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! History capture state machine
//!
//! A history capture arms the board's long record memory and waits until the
//! board reports the record complete. Only one capture may be in flight; the
//! `Idle → CaptureInFlight` transition is a single compare-and-set so two
//! callers can never both reach the board.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::broadcast;

use super::timestamp::Timestamp;
use crate::board::AcquisitionBoard;
use crate::error::{MonitorError, MonitorResult};

/// Capacity of the history-ready notification channel
const NOTIFY_CAPACITY: usize = 16;

/// State of the history capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerState {
    Idle = 0,
    CaptureInFlight = 1,
}

impl From<u8> for TriggerState {
    fn from(value: u8) -> Self {
        match value {
            1 => TriggerState::CaptureInFlight,
            _ => TriggerState::Idle,
        }
    }
}

/// Puts the state back to `Idle` when the capture ends, whatever the outcome
struct InFlightGuard<'a> {
    state: &'a AtomicU8,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state.store(TriggerState::Idle as u8, Ordering::SeqCst);
    }
}

/// Bounded, single-flight history capture
pub struct HistoryCapture {
    board: Arc<dyn AcquisitionBoard>,
    state: AtomicU8,
    timeout: Duration,
    poll_interval: Duration,
    notifier: broadcast::Sender<Timestamp>,
}

impl HistoryCapture {
    pub fn new(board: Arc<dyn AcquisitionBoard>, timeout: Duration, poll_interval: Duration) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            board,
            state: AtomicU8::new(TriggerState::Idle as u8),
            timeout,
            poll_interval,
            notifier,
        }
    }

    pub fn state(&self) -> TriggerState {
        TriggerState::from(self.state.load(Ordering::SeqCst))
    }

    /// Receiver of the history-ready notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Timestamp> {
        self.notifier.subscribe()
    }

    /// Run one history capture
    ///
    /// Blocks the calling thread until the board reports the record complete
    /// or the timeout expires. Returns the cycle timestamp of the record.
    ///
    /// # Errors
    ///
    /// * [`MonitorError::CaptureDisabled`] if `enable` is false
    /// * [`MonitorError::ConcurrentCaptureRejected`] if a capture is already
    ///   running, the board is not touched
    /// * [`MonitorError::HardwareTimeout`] if the board never reports ready
    pub fn start(&self, enable: bool) -> MonitorResult<Timestamp> {
        if !enable {
            return Err(MonitorError::CaptureDisabled);
        }

        self.state
            .compare_exchange(
                TriggerState::Idle as u8,
                TriggerState::CaptureInFlight as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| MonitorError::ConcurrentCaptureRejected)?;
        let _guard = InFlightGuard { state: &self.state };

        info!("Starting history capture");
        self.board.start_history_capture();

        let deadline = Instant::now() + self.timeout;
        loop {
            if self.board.is_history_data_ready() {
                break;
            }
            if Instant::now() >= deadline {
                warn!("History data not ready after {:?}", self.timeout);
                return Err(MonitorError::HardwareTimeout(self.timeout));
            }
            thread::sleep(self.poll_interval);
        }

        let timestamp = Timestamp::from_raw(self.board.raw_timestamp());
        if self.notifier.send(timestamp).is_err() {
            debug!("History ready, no subscriber");
        }
        info!("History capture complete at {}.{:09}", timestamp.seconds, timestamp.nanoseconds);
        Ok(timestamp)
    }
}
