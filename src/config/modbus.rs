// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP gateway configuration
//!
//! This module defines the structures for configuring the Modbus TCP gateway
//! that exposes the register space for diagnostics.

use serde::{Deserialize, Serialize};

/// Configuration for the Modbus TCP gateway.
///
/// # Fields
///
/// * `enabled` - Flag to enable or disable the gateway
/// * `port` - TCP port number for the gateway (default: 502)
/// * `address` - Network address for the gateway to bind to (default: 127.0.0.1)
///
/// # Example
///
/// ```
/// use rust_bpm_monitor::config::ModbusConfig;
///
/// let modbus_config = ModbusConfig {
///     enabled: true,
///     port: 5020,
///     address: "0.0.0.0".to_string(),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Flag to enable or disable the gateway.
    pub enabled: bool,

    /// The TCP port the gateway will listen on.
    ///
    /// Valid range is 1-65534. Default value is 502, which is the standard Modbus TCP port.
    pub port: u16,

    /// The network address the gateway will bind to.
    ///
    /// Use "0.0.0.0" to bind to all IPv4 interfaces.
    pub address: String,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 502,
            address: "127.0.0.1".to_string(),
        }
    }
}
