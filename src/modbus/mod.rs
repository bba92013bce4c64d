// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module provides a Modbus TCP gateway to the register space of the
//! monitor, for diagnostic tools that do not speak the front-end protocol.
//!
//! ## Key Components
//!
//! - [`MonitorModbusServer`]: the service answering Modbus requests from the
//!   engine
//! - [`serve`]: accept loop binding one service per connection
//!
//! ## Register Map
//!
//! Every scalar `(offset, channel)` maps to two registers at
//! `(offset · 16 + channel) · 2`, an IEEE-754 `f32` high word first.
//!
//! ### Input Registers (Read-Only)
//!
//! - `0x0000..0x8000`: scalar reads
//! - `0x8000..`: calibrated power reads (same layout, `Power` kind)
//!
//! ### Holding Registers (Read/Write)
//!
//! - `0x0000..0x8000`: scalar writes, two registers per value
//!
//! ## Usage
//!
//! ```no_run
//! use rust_bpm_monitor::config::Config;
//! use rust_bpm_monitor::daemon::launch_daemon::Daemon;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut config = Config::default();
//! config.modbus.enabled = true;
//! let mut daemon = Daemon::new();
//! daemon.launch(&config).await?;
//! # Ok(())
//! # }
//! ```

pub mod modbus_server;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::{error, info};
use tokio::net::TcpListener;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use crate::engine::MonitorEngine;

pub use modbus_server::{
    decode_f32, encode_f32, register_address, MonitorModbusServer, CHANNELS_PER_OFFSET,
    POWER_REGISTER_BASE,
};

/// Serve Modbus TCP requests on `listener` until the task is aborted
///
/// All connections share one holding register shadow.
pub async fn serve(listener: TcpListener, engine: Arc<MonitorEngine>) -> Result<()> {
    if let Ok(local) = listener.local_addr() {
        info!("Modbus gateway listening on {}", local);
    }

    let server = Server::new(listener);
    let holding_registers = Arc::new(Mutex::new(HashMap::new()));

    let on_connected = move |stream, socket_addr| {
        let engine = engine.clone();
        let holding_registers = holding_registers.clone();
        async move {
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(MonitorModbusServer::with_holding_registers(
                    engine.clone(),
                    holding_registers.clone(),
                )))
            })
        }
    };

    let on_process_error = |err| {
        error!("Modbus server error: {err}");
    };

    server.serve(&on_connected, on_process_error).await?;
    Ok(())
}
