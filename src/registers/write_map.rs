// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scalar write table
//!
//! Every offset maps to one control action. The written value arrives as an
//! `f32`; integer controls use its truncation `n = v as i32`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use log::{debug, info};

use crate::acquisition::HistoryCapture;
use crate::address::{Address, ChannelCategory};
use crate::board::AcquisitionBoard;
use crate::calibration::{CalibrationStore, POWER_OFFSET_COLUMN};
use crate::error::{MonitorError, MonitorResult};
use crate::measurement::AcquisitionWindow;

/// kxy scale of the two sum channels (4 and 5)
const KXY_SUM_SCALE: f32 = 32767.0;

/// kxy scale of the position channels
const KXY_POSITION_SCALE: f32 = 1e6;

/// Bound of the acquisition window set by a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowBound {
    SignalStart,
    SignalEnd,
    BackgroundStart,
    BackgroundEnd,
}

impl WindowBound {
    fn apply(self, window: &mut AcquisitionWindow, index: usize) {
        match self {
            WindowBound::SignalStart => window.signal_start = index,
            WindowBound::SignalEnd => window.signal_end = index,
            WindowBound::BackgroundStart => window.background_start = index,
            WindowBound::BackgroundEnd => window.background_end = index,
        }
    }
}

/// Control action served by a scalar write offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    DigitalOutput,
    PulseOutputEnable,
    InternalTrigger,
    /// Offset 3, `1` starts a capture
    HistoryCapture,
    ResetHistoryStorage,
    TriggerExtractRatio,
    HistoryExtractRatio,
    IqStartSync,
    /// Offset 8, power offset of calibration row `channel`
    CalibrationOffset,
    /// Offset 9, `1` reloads the calibration file
    CalibrationReload,
    BpmK1,
    BpmK2,
    BpmK3,
    BpmPhaseOffset,
    Kxy,
    XyOffset,
    XyLimit,
    BoardReset,
    SumLimit,
    /// Offset 19, pulsed if non-zero
    OperatingMode,
    Window(WindowBound),
    ProtectFilterTime,
    DdsFrequencyWord,
    SystemLed,
    FanLed,
    TriggerSource,
}

/// State a write can act on
pub struct WriteContext<'a> {
    pub board: &'a dyn AcquisitionBoard,
    pub calibration: &'a CalibrationStore,
    pub calibration_path: &'a Path,
    pub pulsed: &'a AtomicBool,
    pub window: &'a RwLock<AcquisitionWindow>,
    pub history: &'a HistoryCapture,
}

/// Build the offset → action table
pub fn write_table() -> HashMap<u16, WriteAction> {
    use WriteAction::*;

    HashMap::from([
        (0, DigitalOutput),
        (1, PulseOutputEnable),
        (2, InternalTrigger),
        (3, HistoryCapture),
        (4, ResetHistoryStorage),
        (5, TriggerExtractRatio),
        (6, HistoryExtractRatio),
        (7, IqStartSync),
        (8, CalibrationOffset),
        (9, CalibrationReload),
        (10, BpmK1),
        (11, BpmK2),
        (12, BpmK3),
        (13, BpmPhaseOffset),
        (14, Kxy),
        (15, XyOffset),
        (16, XyLimit),
        (17, BoardReset),
        (18, SumLimit),
        (19, OperatingMode),
        (20, Window(WindowBound::SignalStart)),
        (21, Window(WindowBound::SignalEnd)),
        (22, ProtectFilterTime),
        (23, DdsFrequencyWord),
        (24, SystemLed),
        (25, FanLed),
        (26, TriggerSource),
        (27, Window(WindowBound::BackgroundStart)),
        (28, Window(WindowBound::BackgroundEnd)),
    ])
}

/// Convert a window bound written as `f32` into a sample index
fn window_index(value: f32) -> MonitorResult<usize> {
    if !value.is_finite() || value < 0.0 {
        return Err(MonitorError::InvalidWindow(value));
    }
    Ok(value as usize)
}

impl WriteAction {
    /// Whether the action can block the caller for a noticeable time
    pub fn is_blocking(self) -> bool {
        matches!(self, WriteAction::HistoryCapture | WriteAction::CalibrationReload)
    }

    /// Apply the action for `address` with `value`
    pub fn execute(self, address: &Address, value: f32, ctx: &WriteContext<'_>) -> MonitorResult<()> {
        use WriteAction::*;

        let board = ctx.board;
        let channel = address.channel;
        let n = value as i32;

        match self {
            DigitalOutput => {
                let ch = ChannelCategory::Rf.validate(channel)?;
                board.set_digital_output(ch, n);
                info!("Digital output {} set to {}", ch, n);
            }
            PulseOutputEnable => {
                board.set_pulse_output_enable(value as u16);
                info!("Pulse output enable set to {}", value as u16);
            }
            InternalTrigger => {
                board.set_internal_trigger_enable(n);
                info!("Internal trigger enable set to {}", n);
            }
            HistoryCapture => {
                let timestamp = ctx.history.start(n == 1)?;
                info!(
                    "History capture done, record time {}.{:09}",
                    timestamp.seconds, timestamp.nanoseconds
                );
            }
            ResetHistoryStorage => {
                board.reset_history_storage(n);
                info!("History storage reset set to {}", n);
            }
            TriggerExtractRatio => {
                board.set_trigger_extract_ratio(value);
                info!("Trigger extract ratio set to {}", value);
            }
            HistoryExtractRatio => {
                board.set_history_extract_ratio(value);
                info!("History extract ratio set to {}", value);
            }
            IqStartSync => {
                board.set_iq_start_sync(n);
                info!("IQ start sync set to {}", n);
            }
            CalibrationOffset => {
                ctx.calibration
                    .set(channel as usize, POWER_OFFSET_COLUMN, value as f64)?;
                info!("Power offset of calibration row {} set to {}", channel, value);
            }
            CalibrationReload => {
                if n == 1 {
                    let rows = ctx.calibration.load(ctx.calibration_path)?;
                    info!("Calibration reloaded, {} rows", rows);
                } else {
                    debug!("Calibration reload ignored for value {}", value);
                }
            }
            BpmK1 => {
                let ch = ChannelCategory::Rf.validate(channel)?;
                board.set_bpm_k1(ch, value);
                info!("BPM k1[{}] set to {}", ch, value);
            }
            BpmK2 => {
                let ch = ChannelCategory::Rf.validate(channel)?;
                board.set_bpm_k2(ch, value);
                info!("BPM k2[{}] set to {}", ch, value);
            }
            BpmK3 => {
                let ch = ChannelCategory::Rf.validate(channel)?;
                board.set_bpm_k3(ch, value);
                info!("BPM k3[{}] set to {}", ch, value);
            }
            BpmPhaseOffset => {
                let ch = ChannelCategory::Rf.validate(channel)?;
                board.set_bpm_phase_offset(ch, value);
                info!("BPM phase offset[{}] set to {}", ch, value);
            }
            Kxy => {
                let ch = ChannelCategory::Electrode.validate(channel)?;
                let scale = if ch == 4 || ch == 5 {
                    KXY_SUM_SCALE
                } else {
                    KXY_POSITION_SCALE
                };
                let raw = (value * scale) as i32;
                board.set_bpm_kxy(ch, raw);
                info!("BPM kxy[{}] set to {} (raw {})", ch, value, raw);
            }
            XyOffset => {
                let ch = ChannelCategory::Electrode.validate(channel)?;
                let raw = n.saturating_mul(1_000_000);
                board.set_bpm_xy_offset(ch, raw);
                info!("BPM xy offset[{}] set to {} (raw {})", ch, n, raw);
            }
            XyLimit => {
                let ch = ChannelCategory::Electrode.validate(channel)?;
                let raw = n.saturating_mul(1_000);
                board.set_bpm_xy_limit(ch, raw);
                info!("BPM xy limit[{}] set to {} (raw {})", ch, n, raw);
            }
            BoardReset => {
                board.reset_board(n);
                info!("Board reset set to {}", n);
            }
            SumLimit => {
                let ch = ChannelCategory::Electrode.validate(channel)?;
                board.set_bpm_sum_limit(ch, n);
                info!("BPM sum limit[{}] set to {}", ch, n);
            }
            OperatingMode => {
                let pulsed = n != 0;
                ctx.pulsed.store(pulsed, Ordering::SeqCst);
                info!(
                    "Operating mode set to {}",
                    if pulsed { "pulsed" } else { "CW" }
                );
            }
            Window(bound) => {
                let index = window_index(value)?;
                let mut window = ctx.window.write().unwrap_or_else(|e| e.into_inner());
                bound.apply(&mut window, index);
                info!("{:?} set to {}, window now {:?}", bound, index, *window);
            }
            ProtectFilterTime => {
                board.set_protect_filter_time(value);
                info!("Fast interlock filter time set to {} us", value);
            }
            DdsFrequencyWord => {
                board.set_dds_frequency_word(n);
                info!("DDS frequency control word set to {}", n);
            }
            SystemLed => {
                board.set_system_led_enable(n);
                info!("System LED enable set to {}", n);
            }
            FanLed => {
                board.set_fan_led_state(n);
                info!("Fan LED state set to {}", n);
            }
            TriggerSource => {
                board.select_trigger_source(n);
                info!("Trigger source set to {}", n);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::MockAcquisitionBoard;
    use mockall::predicate::eq;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        calibration: CalibrationStore,
        pulsed: AtomicBool,
        window: RwLock<AcquisitionWindow>,
        history: HistoryCapture,
        path: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                calibration: CalibrationStore::new(),
                pulsed: AtomicBool::new(false),
                window: RwLock::new(AcquisitionWindow::new(4, 8, 0, 2)),
                history: HistoryCapture::new(
                    Arc::new(MockAcquisitionBoard::new()),
                    Duration::from_millis(10),
                    Duration::from_millis(1),
                ),
                path: PathBuf::from("/nonexistent/llrfparameters.csv"),
            }
        }

        fn write(&self, board: &MockAcquisitionBoard, offset: u16, channel: u16, value: f32) -> MonitorResult<()> {
            let ctx = WriteContext {
                board,
                calibration: &self.calibration,
                calibration_path: &self.path,
                pulsed: &self.pulsed,
                window: &self.window,
                history: &self.history,
            };
            write_table()[&offset].execute(&Address::register(offset, channel), value, &ctx)
        }
    }

    #[test]
    fn test_table_offsets() {
        let table = write_table();
        let mut offsets: Vec<u16> = table.keys().copied().collect();
        offsets.sort_unstable();
        assert_eq!(offsets, (0..=28).collect::<Vec<u16>>());
        assert!(table[&3].is_blocking());
        assert!(!table[&14].is_blocking());
    }

    #[test]
    fn test_kxy_scaling() {
        let mut board = MockAcquisitionBoard::new();
        board
            .expect_set_bpm_kxy()
            .with(eq(4), eq(16383))
            .times(1)
            .return_const(());
        board
            .expect_set_bpm_kxy()
            .with(eq(0), eq(1_500_000))
            .times(1)
            .return_const(());
        let fixture = Fixture::new();

        fixture.write(&board, 14, 4, 0.5).unwrap();
        fixture.write(&board, 14, 0, 1.5).unwrap();
        assert!(matches!(
            fixture.write(&board, 14, 8, 1.0),
            Err(MonitorError::OutOfRangeChannel { .. })
        ));
    }

    #[test]
    fn test_xy_offset_and_limit_scaling() {
        let mut board = MockAcquisitionBoard::new();
        board
            .expect_set_bpm_xy_offset()
            .with(eq(2), eq(-3_000_000))
            .times(1)
            .return_const(());
        board
            .expect_set_bpm_xy_limit()
            .with(eq(1), eq(7_000))
            .times(1)
            .return_const(());
        let fixture = Fixture::new();

        fixture.write(&board, 15, 2, -3.9).unwrap();
        fixture.write(&board, 16, 1, 7.2).unwrap();
    }

    #[test]
    fn test_operating_mode() {
        let board = MockAcquisitionBoard::new();
        let fixture = Fixture::new();

        fixture.write(&board, 19, 0, 1.0).unwrap();
        assert!(fixture.pulsed.load(Ordering::SeqCst));
        fixture.write(&board, 19, 0, 0.0).unwrap();
        assert!(!fixture.pulsed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_window_registers() {
        let board = MockAcquisitionBoard::new();
        let fixture = Fixture::new();

        fixture.write(&board, 20, 0, 100.0).unwrap();
        fixture.write(&board, 21, 0, 200.0).unwrap();
        fixture.write(&board, 27, 0, 10.0).unwrap();
        fixture.write(&board, 28, 0, 50.0).unwrap();
        assert_eq!(
            *fixture.window.read().unwrap(),
            AcquisitionWindow::new(100, 200, 10, 50)
        );

        assert!(matches!(
            fixture.write(&board, 20, 0, -1.0),
            Err(MonitorError::InvalidWindow(_))
        ));
        assert!(fixture.write(&board, 21, 0, f32::NAN).is_err());
        assert_eq!(fixture.window.read().unwrap().signal_start, 100);
    }

    #[test]
    fn test_calibration_offset_and_reload() {
        let board = MockAcquisitionBoard::new();
        let fixture = Fixture::new();

        fixture.write(&board, 8, 3, -1.5).unwrap();
        assert_eq!(fixture.calibration.get(3, POWER_OFFSET_COLUMN).unwrap(), -1.5);
        assert!(matches!(
            fixture.write(&board, 8, 9, 1.0),
            Err(MonitorError::CalibrationIndex { .. })
        ));

        // Any value but 1 is ignored, 1 with a missing file fails
        fixture.write(&board, 9, 0, 0.0).unwrap();
        assert!(matches!(
            fixture.write(&board, 9, 0, 1.0),
            Err(MonitorError::CalibrationFile { .. })
        ));
        assert_eq!(fixture.calibration.get(3, POWER_OFFSET_COLUMN).unwrap(), -1.5);
    }

    #[test]
    fn test_history_capture_disabled() {
        let board = MockAcquisitionBoard::new();
        let fixture = Fixture::new();
        assert!(matches!(
            fixture.write(&board, 3, 0, 0.0),
            Err(MonitorError::CaptureDisabled)
        ));
    }

    #[test]
    fn test_simple_controls() {
        let mut board = MockAcquisitionBoard::new();
        board
            .expect_set_digital_output()
            .with(eq(2), eq(1))
            .times(1)
            .return_const(());
        board
            .expect_set_pulse_output_enable()
            .with(eq(1u16))
            .times(1)
            .return_const(());
        board
            .expect_set_trigger_extract_ratio()
            .with(eq(0.5f32))
            .times(1)
            .return_const(());
        board
            .expect_set_dds_frequency_word()
            .with(eq(123))
            .times(1)
            .return_const(());
        let fixture = Fixture::new();

        fixture.write(&board, 0, 2, 1.0).unwrap();
        fixture.write(&board, 1, 0, 1.0).unwrap();
        fixture.write(&board, 5, 0, 0.5).unwrap();
        fixture.write(&board, 23, 0, 123.9).unwrap();
    }
}
