// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Faults and replay of the simulated board seen through the engine
//!
//! Each test corrupts one RF channel of a seeded board and checks what the
//! extracted waveforms and the derived registers report.

use std::fs;
use std::sync::{Arc, Once};

use anyhow::Result;
use rust_bpm_monitor::address::{Address, AddressKind};
use rust_bpm_monitor::board::{
    create_board, AcquisitionBoard, FaultConfig, FaultType, ReplayConfig, SimulatedBoard,
};
use rust_bpm_monitor::calibration::CalibrationStore;
use rust_bpm_monitor::config::Config;
use rust_bpm_monitor::measurement::{amp_to_power, counts_to_vrms};
use rust_bpm_monitor::MonitorEngine;
use tempfile::tempdir;

static INIT: Once = Once::new();

fn init_logger() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.board.simulator.seed = Some(21);
    config.board.simulator.noise_level = 0.0;
    config.board.simulator.phase_jitter_deg = 0.0;
    config
}

fn setup(config: Config) -> (Arc<SimulatedBoard>, MonitorEngine) {
    init_logger();
    let board = Arc::new(SimulatedBoard::new(config.board.simulator.clone()));
    let engine = MonitorEngine::new(board.clone(), Arc::new(CalibrationStore::new()), &config);
    (board, engine)
}

/// Amplitude waveform of an RF channel, in Vrms
fn amplitude(engine: &MonitorEngine, rf_channel: u16) -> Vec<f32> {
    engine.extract_waveform(&Address::waveform(11 + rf_channel)).0
}

/// Background-subtracted average of the simulated pulse without faults
fn nominal_average(config: &Config) -> f32 {
    let c = &config.board.simulator;
    counts_to_vrms(c.pulse_amplitude) - counts_to_vrms(c.baseline_amplitude)
}

#[test]
fn test_dead_channel_reads_zero() {
    let config = quiet_config();
    let (board, engine) = setup(config.clone());
    board.inject_fault(FaultConfig::new(0, FaultType::ChannelDead));

    assert!(amplitude(&engine, 0).iter().all(|&v| v == 0.0));
    assert_eq!(engine.read_scalar(&Address::register(34, 0)), 0.0);

    // Channel 1 is healthy
    amplitude(&engine, 1);
    let average = engine.read_scalar(&Address::register(34, 1));
    assert!((average - nominal_average(&config)).abs() < 1e-5, "got {average}");
}

#[test]
fn test_saturated_channel_reads_full_scale() {
    let (board, engine) = setup(quiet_config());
    board.inject_fault(FaultConfig::new(1, FaultType::Saturated));

    let samples = amplitude(&engine, 1);
    let full_scale = counts_to_vrms(32767.0);
    assert!(samples.iter().all(|&v| v == full_scale));
    // Flat waveform, nothing left after background subtraction
    assert_eq!(engine.read_scalar(&Address::register(34, 1)), 0.0);
}

#[test]
fn test_noisy_channel_keeps_its_average() {
    let config = quiet_config();
    let (board, engine) = setup(config.clone());
    board.inject_fault(FaultConfig::new(2, FaultType::Noisy).with_magnitude(0.1));

    let samples = amplitude(&engine, 2);
    let flattop = counts_to_vrms(config.board.simulator.pulse_amplitude);
    let off = samples[4000..6000]
        .iter()
        .filter(|&&v| (v - flattop).abs() > flattop * 0.01)
        .count();
    assert!(off > 1000, "only {off} noisy samples");

    let average = engine.read_scalar(&Address::register(34, 2));
    let nominal = nominal_average(&config);
    assert!((average - nominal).abs() < nominal * 0.02, "got {average}");
}

#[test]
fn test_drifting_channel_grows() {
    let (board, engine) = setup(quiet_config());
    board.inject_fault(FaultConfig::new(3, FaultType::Drift));

    let first = amplitude(&engine, 3)[5000];
    let second = amplitude(&engine, 3)[5000];
    assert!((second / first - 1.4 / 1.2).abs() < 1e-5);
    assert_eq!(board.fault_triggers(FaultType::Drift), 2);
}

#[test]
fn test_stuck_channel_freezes_waveform() {
    let mut config = quiet_config();
    config.board.simulator.noise_level = 0.05;
    let (board, engine) = setup(config);
    board.inject_fault(FaultConfig::new(4, FaultType::Stuck));

    assert_eq!(amplitude(&engine, 4), amplitude(&engine, 4));
    // A healthy channel draws fresh noise on every frame
    assert_ne!(amplitude(&engine, 5), amplitude(&engine, 5));
}

#[test]
fn test_invalid_data_channel() -> Result<()> {
    let (board, engine) = setup(quiet_config());
    // Channel 6 uses calibration row 7
    engine.calibration().set(7, 2, 1e-4)?;
    engine.calibration().set(7, 3, 0.01)?;
    board.inject_fault(FaultConfig::new(6, FaultType::InvalidData));

    assert!(amplitude(&engine, 6).iter().all(|v| v.is_nan()));

    // The RF snapshot is NaN too, power reads as if the amplitude were 0
    assert!(engine.read_scalar(&Address::register(0, 6)).is_nan());
    let power = engine.read_scalar(&Address::new(AddressKind::Power, 0, 6));
    let expected = amp_to_power(0.0, 0.0, 1e-4, 0.01) as f32;
    assert!(power.is_finite());
    assert!((power - expected).abs() <= expected.abs() * 1e-5, "got {power}");
    Ok(())
}

#[test]
fn test_phase_jump_on_phase_waveform() {
    let (board, engine) = setup(quiet_config());
    board.inject_fault(FaultConfig::new(7, FaultType::PhaseJump));

    // RF channel 7 sits at 30 + 70 degrees, half a turn later it reads -80
    let (phase, _) = engine.extract_waveform(&Address::waveform(28));
    assert!(phase.iter().all(|&p| p == -80.0));
    assert!(amplitude(&engine, 7).iter().any(|&v| v != 0.0));
}

#[test]
fn test_faults_loaded_from_config() -> Result<()> {
    let yaml = "board:\n  kind: simulated\n  simulator:\n    seed: 4\n    faults:\n      - channel: 2\n        fault: channel_dead\n      - channel: 5\n        fault: spike\n        probability: 0.5\n        magnitude: 3.0\n";
    let config = Config::from_yaml_str(yaml)?;
    assert_eq!(
        config.board.simulator.faults,
        vec![
            FaultConfig::new(2, FaultType::ChannelDead),
            FaultConfig::new(5, FaultType::Spike)
                .with_probability(0.5)
                .with_magnitude(3.0),
        ]
    );

    let board = create_board(&config.board)?;
    assert_eq!(board.rf_snapshot(2).amplitude, 0.0);

    let bad = "board:\n  kind: simulated\n  simulator:\n    faults:\n      - channel: 2\n        fault: meltdown\n";
    assert!(Config::from_yaml_str(bad).is_err());
    Ok(())
}

#[test]
fn test_replayed_levels_reach_registers() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("rf_recording.csv");
    let mut contents = String::from("# timestamp, ch0_amp, ch0_phase, ...\n");
    for frame in 0..2 {
        contents.push_str(&format!("{}", frame as f64 * 0.1));
        for channel in 0..8 {
            contents.push_str(&format!(", {}, {}", 10_000 * (frame + 1), channel));
        }
        contents.push('\n');
    }
    fs::write(&path, contents)?;

    let mut config = quiet_config();
    config.board.simulator.replay = Some(ReplayConfig {
        path: path.clone(),
        loop_mode: false,
        speed: 1.0,
    });
    let board = create_board(&config.board)?;
    let engine = MonitorEngine::new(board, Arc::new(CalibrationStore::new()), &config);

    assert_eq!(engine.read_scalar(&Address::register(0, 3)), 10_000.0);
    assert_eq!(
        engine.read_scalar(&Address::new(AddressKind::Phase, 0, 3)),
        3.0
    );

    // The trigger cycle latches the marker, which moves to the next frame
    engine.poller().poll_once();
    assert_eq!(engine.read_scalar(&Address::register(0, 3)), 20_000.0);
    engine.poller().poll_once();
    assert_eq!(engine.read_scalar(&Address::register(0, 3)), 20_000.0);
    Ok(())
}
