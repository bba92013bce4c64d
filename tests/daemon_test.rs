// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::time::Duration;

use anyhow::Result;
use rust_bpm_monitor::acquisition::Timestamp;
use rust_bpm_monitor::config::Config;
use rust_bpm_monitor::daemon::launch_daemon::Daemon;
use rust_bpm_monitor::modbus::{decode_f32, register_address};
use tempfile::tempdir;
use tokio::time;
use tokio_modbus::prelude::*;

/// Register address of a scalar known to sit in the scalar area
fn reg(offset: u16, channel: u16) -> u16 {
    register_address(offset, channel).expect("scalar register")
}

fn test_config() -> Result<(Config, tempfile::TempDir)> {
    let temp_dir = tempdir()?;
    let mut config = Config::default();
    config.acquisition.poll_interval_ms = 10;
    config.board.simulator.seed = Some(5);
    config.calibration.path = temp_dir.path().join("missing.csv");
    config.modbus.enabled = true;
    config.modbus.port = 0;
    Ok((config, temp_dir))
}

#[tokio::test]
async fn test_daemon_runs_trigger_cycles() -> Result<()> {
    let (config, _dir) = test_config()?;

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;
    let engine = daemon.engine().expect("engine is built by launch");

    let mut ready = engine.subscribe_trigger_ready();
    let first = time::timeout(Duration::from_secs(2), ready.recv()).await??;
    let second = time::timeout(Duration::from_secs(2), ready.recv()).await??;
    assert!(second > first);
    assert_ne!(engine.latest_timestamp(), Timestamp::default());

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_daemon_serves_modbus() -> Result<()> {
    let (config, _dir) = test_config()?;

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;
    let addr = daemon.modbus_addr().expect("gateway is bound");

    let mut ctx = tcp::connect(addr).await?;
    // Electrode 1 of the simulated board sits 5 % above the base level
    let data = ctx.read_input_registers(reg(5, 1), 2).await??;
    assert_eq!(decode_f32(data[0], data[1]), 1_050_000.0);
    ctx.disconnect().await?;

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_daemon_without_services() -> Result<()> {
    let (mut config, _dir) = test_config()?;
    config.acquisition.enabled = false;
    config.modbus.enabled = false;

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;
    assert!(daemon.modbus_addr().is_none());

    let engine = daemon.engine().expect("engine is built by launch");
    time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.latest_timestamp(), Timestamp::default());

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}
