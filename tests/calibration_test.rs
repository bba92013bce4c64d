// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use rust_bpm_monitor::address::{Address, AddressKind};
use rust_bpm_monitor::board::{RfReading, SimulatedBoard};
use rust_bpm_monitor::calibration::CalibrationStore;
use rust_bpm_monitor::config::Config;
use rust_bpm_monitor::measurement::amp_to_power;
use rust_bpm_monitor::MonitorEngine;
use tempfile::tempdir;

fn table(slope: f64, intercept: f64) -> String {
    (0..9)
        .map(|row| format!("{row},99,{slope},{intercept},0,99,0\n"))
        .collect()
}

fn engine_with_table(path: &Path) -> (Arc<SimulatedBoard>, MonitorEngine) {
    let mut config = Config::default();
    config.board.simulator.seed = Some(1);
    config.calibration.path = path.to_path_buf();

    let board = Arc::new(SimulatedBoard::new(config.board.simulator.clone()));
    let engine = MonitorEngine::new(board.clone(), Arc::new(CalibrationStore::new()), &config);
    (board, engine)
}

fn assert_close(actual: f32, expected: f64) {
    let tolerance = expected.abs() * 1e-5 + 1e-9;
    assert!(
        (actual as f64 - expected).abs() <= tolerance,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_reload_through_register() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("llrfparameters.csv");
    fs::write(&path, table(1e-4, 0.01))?;

    let (_board, engine) = engine_with_table(&path);
    assert_eq!(engine.calibration().get(3, 2)?, 0.0);

    // Only 1 triggers a reload
    engine.write_scalar(&Address::register(9, 0), 0.0);
    assert_eq!(engine.calibration().get(3, 2)?, 0.0);

    engine.write_scalar(&Address::register(9, 0), 1.0);
    assert_eq!(engine.calibration().get(3, 2)?, 1e-4);
    assert_eq!(engine.calibration().get(3, 3)?, 0.01);
    // Reserved columns are not loaded
    assert_eq!(engine.calibration().get(3, 1)?, 0.0);
    assert_eq!(engine.calibration().get(3, 5)?, 0.0);

    Ok(())
}

#[test]
fn test_power_offset_survives_reload() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("llrfparameters.csv");
    fs::write(&path, table(1e-4, 0.0))?;

    let (_board, engine) = engine_with_table(&path);
    engine.write_scalar(&Address::register(8, 3), 2.5);
    engine.write_scalar(&Address::register(9, 0), 1.0);

    assert_eq!(engine.calibration().get(3, 1)?, 2.5);
    assert_eq!(engine.calibration().get(3, 2)?, 1e-4);
    Ok(())
}

#[test]
fn test_power_read_uses_loaded_table() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("llrfparameters.csv");
    fs::write(&path, table(2e-4, 0.05))?;

    let (board, engine) = engine_with_table(&path);
    engine.write_scalar(&Address::register(9, 0), 1.0);
    engine.write_scalar(&Address::register(8, 3), -1.5);

    board.set_rf_reading(
        2,
        RfReading {
            amplitude: 12_000.0,
            phase: 10.0,
        },
    );

    // Channel 2 uses calibration row 3
    let power = engine.read_scalar(&Address::new(AddressKind::Power, 0, 2));
    assert_close(power, amp_to_power(12_000.0, -1.5, 2e-4, 0.05));

    // Amplitudes above full scale are clamped before conversion
    board.set_rf_reading(
        2,
        RfReading {
            amplitude: 50_000.0,
            phase: 10.0,
        },
    );
    let power = engine.read_scalar(&Address::new(AddressKind::Power, 0, 2));
    assert_close(power, amp_to_power(32_767.0, -1.5, 2e-4, 0.05));

    Ok(())
}

#[test]
fn test_failed_reload_keeps_table() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("llrfparameters.csv");
    fs::write(&path, table(1e-4, 0.0))?;

    let (_board, engine) = engine_with_table(&path);
    engine.write_scalar(&Address::register(9, 0), 1.0);
    let before = engine.calibration().snapshot();

    fs::remove_file(&path)?;
    assert!(engine
        .try_write_scalar(&Address::register(9, 0), 1.0)
        .is_err());
    assert_eq!(engine.calibration().snapshot(), before);

    Ok(())
}

#[test]
fn test_offset_register_during_reloads() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("llrfparameters.csv");
    fs::write(&path, table(1e-4, 0.0))?;

    let (_board, engine) = engine_with_table(&path);
    let engine = Arc::new(engine);

    let reloader = {
        let engine = engine.clone();
        std::thread::spawn(move || {
            for _ in 0..100 {
                engine.write_scalar(&Address::register(9, 0), 1.0);
            }
        })
    };
    for step in 0..100 {
        engine.write_scalar(&Address::register(8, 4), step as f32);
    }
    reloader.join().expect("reload thread");

    // The last offset written wins over every reload
    assert_eq!(engine.calibration().get(4, 1)?, 99.0);
    assert_eq!(engine.calibration().get(4, 2)?, 1e-4);
    Ok(())
}
