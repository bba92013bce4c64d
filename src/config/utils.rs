// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::Config;
use crate::address::RF_CHANNELS;
use crate::board::replay::{MAX_SPEED, MIN_SPEED};
use crate::waveform::LIVE_CAPACITY;

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./rust_bpm_monitor --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Intervals**: poll intervals are non-zero and the history timeout is not
///   shorter than one history poll
/// - **Windows**: both windows lie inside a live trigger frame; an empty
///   window is accepted with a warning since it yields a zero average
/// - **Simulator**: the pulse ends after it starts, injected faults name an
///   RF channel and a probability in [0, 1]
/// - **Modbus**: the port is in 1-65534 and the address parses when the
///   gateway is enabled
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    let acquisition = &config.acquisition;
    if acquisition.poll_interval_ms == 0 {
        anyhow::bail!("Trigger poll interval must be greater than zero");
    }
    if acquisition.history_poll_interval_ms == 0 {
        anyhow::bail!("History poll interval must be greater than zero");
    }
    if acquisition.history_timeout_ms < acquisition.history_poll_interval_ms {
        anyhow::bail!(
            "History timeout ({} ms) is shorter than the history poll interval ({} ms)",
            acquisition.history_timeout_ms,
            acquisition.history_poll_interval_ms
        );
    }

    let window = &config.window;
    for (name, start, end) in [
        ("signal", window.signal_start, window.signal_end),
        ("background", window.background_start, window.background_end),
    ] {
        if end > LIVE_CAPACITY {
            anyhow::bail!(
                "The {} window ends at {}, past the {} samples of a trigger frame",
                name,
                end,
                LIVE_CAPACITY
            );
        }
        if end <= start {
            warn!(
                "The {} window {}..{} is empty, averages will read 0",
                name, start, end
            );
        }
    }

    let simulator = &config.board.simulator;
    if simulator.pulse_end <= simulator.pulse_start {
        anyhow::bail!(
            "Simulated pulse ends at {} before it starts at {}",
            simulator.pulse_end,
            simulator.pulse_start
        );
    }

    for fault in &simulator.faults {
        if fault.channel >= RF_CHANNELS as usize {
            anyhow::bail!(
                "Simulated {} fault on RF channel {}, the board has {}",
                fault.fault,
                fault.channel,
                RF_CHANNELS
            );
        }
        if !(0.0..=1.0).contains(&fault.probability) {
            anyhow::bail!(
                "Probability {} of the {} fault on channel {} is outside [0, 1]",
                fault.probability,
                fault.fault,
                fault.channel
            );
        }
    }
    if let Some(replay) = &simulator.replay {
        if !(MIN_SPEED..=MAX_SPEED).contains(&replay.speed) {
            warn!(
                "Replay speed {} will be clamped to {}..{}",
                replay.speed, MIN_SPEED, MAX_SPEED
            );
        }
    }

    if config.modbus.port < 1 || config.modbus.port > 65534 {
        anyhow::bail!("Invalid Modbus port number: {}", config.modbus.port);
    }
    if config.modbus.enabled && !is_valid_ip_address(&config.modbus.address) {
        anyhow::bail!("Invalid Modbus address: {}", config.modbus.address);
    }

    Ok(())
}
