// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the BPM monitor
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings for the monitor. The configuration is backed by a
//! YAML file and validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! The configuration is organized as a nested structure with sections:
//! - `acquisition`: trigger poller cadence, history capture bounds, startup mode
//! - `window`: signal and background windows of the averaging engine
//! - `calibration`: location of the calibration table
//! - `board`: board backend and simulator parameters
//! - `modbus`: settings of the Modbus TCP register gateway
//!
//! ## Usage
//!
//! ```no_run
//! use rust_bpm_monitor::config::{BoardKind, Config};
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some(BoardKind::Simulated),    // Board backend
//!     None,                          // Calibration file
//!     Some(true),                    // Enable Modbus
//!     Some("0.0.0.0".to_string()),   // Modbus address
//!     Some(5020),                    // Modbus port
//! );
//!
//! println!("Poll interval: {} ms", config.acquisition.poll_interval_ms);
//! ```

pub mod acquisition;
pub mod board;
pub mod calibration;
pub mod modbus;
pub mod utils;
pub mod window;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

// Re-export all types for public API
pub use acquisition::AcquisitionConfig;
pub use board::{BoardConfig, BoardKind, NoiseModel, SimulatorConfig};
pub use calibration::CalibrationConfig;
pub use modbus::ModbusConfig;
pub use utils::{is_valid_ip_address, output_config_schema};
pub use window::WindowConfig;

/// Root configuration structure of the monitor.
///
/// # Structure
///
/// The configuration is deserialized from and serialized to YAML using the
/// serde framework. The file is validated against the embedded JSON schema
/// before deserialization so that a malformed file is reported precisely.
///
/// # Default Values
///
/// Each section uses default values when not explicitly specified in the
/// configuration file, an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Acquisition state machine settings.
    ///
    /// Controls the trigger poller, the history capture wait and whether the
    /// monitor starts in pulsed or CW mode.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Averaging windows, in sample indices.
    ///
    /// Registers 20, 21, 27 and 28 change these at run time; the change is
    /// not written back to the file.
    #[serde(default)]
    pub window: WindowConfig,

    /// Calibration table location and loading policy.
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Board backend selection.
    #[serde(default)]
    pub board: BoardConfig,

    /// Modbus TCP gateway settings.
    #[serde(default)]
    pub modbus: ModbusConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with the default values. A file that fails
    /// schema validation, deserialization or the additional rules produces a
    /// `*.sample.yaml` next to it and an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        Self::from_yaml_str(&contents).inspect_err(|_| {
            if let Err(e) = Self::create_sample_config(path) {
                error!("Failed to create sample config: {}", e);
            }
        })
    }

    /// Parse and validate a configuration held in memory
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value =
            serde_yml::from_str(contents).context("Failed to parse YAML configuration")?;

        let json_value = serde_json::to_value(&yaml_value)
            .context("Failed to convert YAML to JSON for validation")?;

        // An empty document is an all-default configuration
        let json_value = if json_value.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            json_value
        };

        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating configuration against schema");
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = serde_json::from_value(json_value)
            .context("Failed to deserialize configuration")?;

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values explicitly provided override the loaded configuration.
    ///
    /// # Parameters
    ///
    /// * `board` - Board backend
    /// * `calibration` - Path of the calibration table
    /// * `modbus_enabled` - Enable or disable the Modbus gateway
    /// * `modbus_address` - Network address the Modbus gateway binds to
    /// * `modbus_port` - TCP port of the Modbus gateway
    pub fn apply_args(
        &mut self,
        board: Option<BoardKind>,
        calibration: Option<PathBuf>,
        modbus_enabled: Option<bool>,
        modbus_address: Option<String>,
        modbus_port: Option<u16>,
    ) {
        if let Some(kind) = board {
            debug!("Overriding board kind from command line: {:?}", kind);
            self.board.kind = kind;
        }
        if let Some(path) = calibration {
            debug!("Overriding calibration file from command line: {:?}", path);
            self.calibration.path = path;
        }

        // Apply Modbus settings
        if let Some(enabled) = modbus_enabled {
            debug!("Overriding Modbus enabled from command line: {}", enabled);
            self.modbus.enabled = enabled;
        }
        if let Some(port) = modbus_port {
            debug!("Overriding Modbus port from command line: {}", port);
            self.modbus.port = port;
        }
        if let Some(address) = modbus_address {
            debug!("Overriding Modbus address from command line: {}", address);
            self.modbus.address = address;
        }
    }
}
