// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use rust_bpm_monitor::acquisition::{Timestamp, TriggerState};
use rust_bpm_monitor::address::{Address, AddressKind};
use rust_bpm_monitor::board::{
    AcquisitionBoard, RawTimestamp, RfReading, SimulatedBoard, TriggerBank,
};
use rust_bpm_monitor::calibration::CalibrationStore;
use rust_bpm_monitor::config::Config;
use rust_bpm_monitor::measurement::counts_to_vrms;
use rust_bpm_monitor::waveform::{BufferId, LIVE_CAPACITY};
use rust_bpm_monitor::{MonitorEngine, MonitorError};

static INIT: Once = Once::new();

fn init_logger() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

fn setup(config: Config) -> (Arc<SimulatedBoard>, MonitorEngine) {
    init_logger();
    let board = Arc::new(SimulatedBoard::new(config.board.simulator.clone()));
    let engine = MonitorEngine::new(board.clone(), Arc::new(CalibrationStore::new()), &config);
    (board, engine)
}

fn seeded_config() -> Config {
    let mut config = Config::default();
    config.board.simulator.seed = Some(1234);
    config.acquisition.history_poll_interval_ms = 1;
    config
}

#[test]
fn test_amplitude_waveform_scaling() {
    let (board, engine) = setup(seeded_config());

    let raw: Vec<f32> = (0..LIVE_CAPACITY).map(|i| (i * 100) as f32).collect();
    board.set_waveform(TriggerBank::Processed, 4, raw.clone());

    // Waveform 13 is the amplitude of RF channel 2, processed channel 4
    let (samples, _) = engine.extract_waveform(&Address::waveform(13));
    assert_eq!(samples.len(), LIVE_CAPACITY);
    for (i, (&out, &count)) in samples.iter().zip(&raw).enumerate().step_by(997) {
        let expected = counts_to_vrms(count);
        assert!(
            (out - expected).abs() <= expected.abs() * 1e-6,
            "sample {i}: expected {expected}, got {out}"
        );
    }
    assert_eq!(
        engine.channel_buffer(BufferId::LiveAmplitude(2)),
        Some(samples)
    );
}

#[test]
fn test_average_voltage_register() {
    let (board, engine) = setup(seeded_config());

    // Background 0..1000 at 1.28e5 counts, signal 4000..6000 at 1.28e6 counts
    let mut raw = vec![1.28e5; LIVE_CAPACITY];
    raw[4000..6000].fill(1.28e6);
    board.set_waveform(TriggerBank::Processed, 0, raw);

    engine.extract_waveform(&Address::waveform(11));
    let average = engine.read_scalar(&Address::register(34, 0));
    let expected = std::f32::consts::SQRT_2 * 0.9;
    assert!((average - expected).abs() < 1e-4, "got {average}");

    // Other channels are untouched
    assert_eq!(engine.read_scalar(&Address::register(34, 1)), 0.0);
}

#[test]
fn test_window_change_moves_average() {
    let (board, engine) = setup(seeded_config());

    let mut raw = vec![0.0; LIVE_CAPACITY];
    raw[7000..8000].fill(1.28e6);
    board.set_waveform(TriggerBank::Processed, 0, raw);

    engine.extract_waveform(&Address::waveform(11));
    assert_eq!(engine.read_scalar(&Address::register(34, 0)), 0.0);

    engine.write_scalar(&Address::register(21, 0), 8000.0);
    engine.write_scalar(&Address::register(20, 0), 7000.0);
    engine.extract_waveform(&Address::waveform(11));
    let average = engine.read_scalar(&Address::register(34, 0));
    assert!((average - std::f32::consts::SQRT_2).abs() < 1e-5);
}

#[test]
fn test_position_waveform_and_register() {
    let (board, engine) = setup(seeded_config());

    let mut raw = vec![0.0; LIVE_CAPACITY];
    raw[4000..6000].fill(250.0);
    board.set_waveform(TriggerBank::Processed, 17, raw);

    // Waveform 62 is position Y1, processed channel 17, in mm
    let (samples, _) = engine.extract_waveform(&Address::waveform(62));
    assert_eq!(samples[4500], 0.25);
    assert_eq!(samples[0], 0.0);

    // CW mode reads the FPGA register, nm to mm
    let cw = engine.read_scalar(&Address::register(29, 1));
    assert!((cw - (-0.08)).abs() < 1e-6, "got {cw}");

    engine.write_scalar(&Address::register(19, 0), 1.0);
    assert!(engine.is_pulsed());
    let pulsed = engine.read_scalar(&Address::register(29, 1));
    assert!((pulsed - 0.25 / 1000.0).abs() < 1e-9, "got {pulsed}");
}

#[test]
fn test_flattop_phase_mean_in_pulsed_mode() {
    let mut config = seeded_config();
    config.acquisition.pulsed_mode = true;
    let (board, engine) = setup(config);

    for (rf, phase) in [(1usize, 10.0f32), (2, 20.0), (3, 60.0)] {
        let mut raw = vec![0.0; LIVE_CAPACITY];
        raw[6000] = phase;
        board.set_waveform(TriggerBank::Processed, 2 * rf + 1, raw);
        engine.extract_waveform(&Address::waveform(21 + rf as u16));
    }

    let mean = engine.read_scalar(&Address::register(32, 0));
    assert!((mean - 30.0).abs() < 1e-5, "got {mean}");
    assert_eq!(engine.derived_values().flattop_phase[2], 20.0);
}

#[test]
fn test_electrode_arithmetic() {
    let (board, engine) = setup(seeded_config());
    board.set_electrode_voltage(0, 2_000_000_000);
    board.set_electrode_voltage(2, 1_000_000_000);

    // Pair (0, 2) overflows i32 when summed
    let sum = engine.read_scalar(&Address::register(16, 0));
    assert_eq!(sum, 3.0e9);
    let difference = engine.read_scalar(&Address::register(10, 0));
    assert_eq!(difference, 1.0e9);
    let normalized = engine.read_scalar(&Address::register(20, 0));
    assert!((normalized - 1.0 / 3.0).abs() < 1e-6);

    board.set_electrode_voltage(0, 0);
    board.set_electrode_voltage(2, 0);
    assert_eq!(engine.read_scalar(&Address::register(20, 0)), 0.0);
}

#[test]
fn test_rf_snapshot_reads() {
    let (board, engine) = setup(seeded_config());
    board.set_rf_reading(
        5,
        RfReading {
            amplitude: 1234.0,
            phase: -45.0,
        },
    );

    assert_eq!(engine.read_scalar(&Address::register(0, 5)), 1234.0);
    assert_eq!(
        engine.read_scalar(&Address::new(AddressKind::Phase, 0, 5)),
        -45.0
    );
    assert!(matches!(
        engine.try_read_scalar(&Address::register(0, 8)),
        Err(MonitorError::OutOfRangeChannel { .. })
    ));
}

#[test]
fn test_digital_output_loopback() {
    let (board, engine) = setup(seeded_config());
    engine.write_scalar(&Address::register(0, 3), 1.0);
    assert_eq!(board.last_control("digital_output[3]"), Some(1.0));
    assert_eq!(engine.read_scalar(&Address::register(1, 3)), 1.0);
}

#[test]
fn test_history_capture_notifies() -> Result<()> {
    let (board, engine) = setup(seeded_config());
    let mut ready = engine.subscribe_history_ready();

    engine.try_write_scalar(&Address::register(3, 0), 1.0)?;
    assert_eq!(engine.history().state(), TriggerState::Idle);
    assert_eq!(board.stats().history_triggers, 1);

    let timestamp = ready.try_recv()?;
    assert_eq!(timestamp, Timestamp::from_raw(board.raw_timestamp()));
    assert_eq!(engine.read_scalar(&Address::register(4, 0)), 1.0);

    // Any value but 1 is refused without touching the board
    assert!(matches!(
        engine.try_write_scalar(&Address::register(3, 0), 0.0),
        Err(MonitorError::CaptureDisabled)
    ));
    assert_eq!(board.stats().history_triggers, 1);
    Ok(())
}

#[test]
fn test_history_capture_timeout() {
    let mut config = seeded_config();
    config.acquisition.history_timeout_ms = 20;
    let (board, engine) = setup(config);
    board.set_history_never_ready(true);

    let result = engine.try_write_scalar(&Address::register(3, 0), 1.0);
    assert!(matches!(result, Err(MonitorError::HardwareTimeout(_))));
    assert_eq!(engine.history().state(), TriggerState::Idle);
}

#[test]
fn test_concurrent_capture_rejected() {
    let mut config = seeded_config();
    config.acquisition.history_timeout_ms = 300;
    let (board, engine) = setup(config);
    board.set_history_never_ready(true);
    let engine = Arc::new(engine);

    let first = {
        let engine = engine.clone();
        thread::spawn(move || engine.try_write_scalar(&Address::register(3, 0), 1.0))
    };

    // Wait for the first capture to be in flight
    while engine.history().state() != TriggerState::CaptureInFlight {
        thread::sleep(Duration::from_millis(1));
    }

    let second = engine.try_write_scalar(&Address::register(3, 0), 1.0);
    assert!(matches!(second, Err(MonitorError::ConcurrentCaptureRejected)));
    assert_eq!(board.stats().history_triggers, 1);

    let first = first.join().unwrap();
    assert!(matches!(first, Err(MonitorError::HardwareTimeout(_))));
    assert_eq!(engine.history().state(), TriggerState::Idle);
}

#[test]
fn test_trigger_cycle_timestamp() -> Result<()> {
    let (board, engine) = setup(seeded_config());
    let mut ready = engine.subscribe_trigger_ready();

    let raw = RawTimestamp {
        tai_seconds: 631_152_000 + 28_800 + 1_000,
        tai_ticks: 62_500_000 - 1,
    };
    board.set_raw_timestamp(Some(raw));

    let published = engine.poller().poll_once();
    let expected = Timestamp {
        seconds: 1_000,
        nanoseconds: 999_999_984,
    };
    assert_eq!(published, Some(expected));
    assert_eq!(ready.try_recv()?, expected);
    assert_eq!(engine.latest_timestamp(), expected);

    let (_, stamped) = engine.extract_waveform(&Address::waveform(1));
    assert_eq!(stamped, expected);
    assert_eq!(board.stats().capture_markers, 1);
    Ok(())
}
