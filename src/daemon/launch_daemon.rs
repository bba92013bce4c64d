// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! This module runs the background services of the monitor:
//!
//! - Trigger poller driving the acquisition cycles
//! - Modbus TCP register gateway
//! - System health monitoring (heartbeat)
//!
//! ## Architecture
//!
//! The daemon system uses Tokio's asynchronous runtime to manage concurrent tasks.
//! Each service runs as an independent task sharing one [`MonitorEngine`], and
//! every task polls a shared `running` flag to know when to stop.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_bpm_monitor::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     // Later, trigger a graceful shutdown
//!     daemon.shutdown();
//!     daemon.join().await?;
//!
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time;

use crate::board::create_board;
use crate::calibration::CalibrationStore;
use crate::config::Config;
use crate::engine::MonitorEngine;
use crate::modbus;

/// Ticks of one second between two heartbeat messages
const HEARTBEAT_PERIOD_SECS: u64 = 60;

/// Represents a daemon task manager that coordinates the background services
///
/// # Fields
///
/// * `tasks` - Collection of handles to running tasks for management and cleanup
/// * `running` - Atomic flag shared between tasks to coordinate shutdown
/// * `engine` - Register engine shared by every service, set by [`Daemon::launch`]
/// * `modbus_addr` - Address the Modbus gateway is bound to, if started
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    engine: Option<Arc<MonitorEngine>>,
    modbus_addr: Option<SocketAddr>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_bpm_monitor::daemon::launch_daemon::Daemon;
    ///
    /// let daemon = Daemon::new();
    /// assert!(daemon.engine().is_none());
    /// ```
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            engine: None,
            modbus_addr: None,
        }
    }

    /// Launch all configured tasks based on configuration
    ///
    /// Builds the board, the calibration store and the engine, then starts:
    /// * the trigger poller, if `config.acquisition.enabled` is `true`
    /// * the Modbus gateway, if `config.modbus.enabled` is `true`
    /// * the heartbeat, always
    ///
    /// # Errors
    ///
    /// This function fails if the board backend is not available in this build
    /// or the Modbus gateway cannot bind its address. A calibration file that
    /// cannot be read is only a warning, the table stays at zero.
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let board = create_board(&config.board).context("Failed to create the board")?;

        let calibration = Arc::new(CalibrationStore::new());
        if config.calibration.load_on_startup {
            if let Err(e) = calibration.load(&config.calibration.path) {
                warn!("{}, calibration table left at zero", e);
            }
        }

        let engine = Arc::new(MonitorEngine::new(board, calibration, config));
        self.engine = Some(engine.clone());

        if config.acquisition.enabled {
            self.start_trigger_poller(&engine)?;
        }

        if config.modbus.enabled {
            self.start_modbus_server(config, &engine).await?;
        }

        self.start_heartbeat(&engine)?;

        info!("Daemon started with {} tasks", self.tasks.len());
        Ok(())
    }

    /// Engine shared by the services, `None` before [`Daemon::launch`]
    pub fn engine(&self) -> Option<Arc<MonitorEngine>> {
        self.engine.clone()
    }

    /// Local address of the Modbus gateway, `None` if it is not running
    pub fn modbus_addr(&self) -> Option<SocketAddr> {
        self.modbus_addr
    }

    fn start_trigger_poller(&mut self, engine: &Arc<MonitorEngine>) -> Result<()> {
        let poller = engine.poller();
        info!(
            "Starting trigger poller every {} ms",
            poller.interval().as_millis()
        );

        let task = tokio::spawn(poller.run(self.running.clone()));
        self.tasks.push(task);
        Ok(())
    }

    /// Start a heartbeat task to monitor daemon health
    ///
    /// Logs the time of the latest trigger cycle once a minute.
    fn start_heartbeat(&mut self, engine: &Arc<MonitorEngine>) -> Result<()> {
        info!("Starting heartbeat monitor");

        let running = self.running.clone();
        let engine = engine.clone();
        let task = tokio::spawn(async move {
            let mut ticks = 0u64;
            while running.load(Ordering::SeqCst) {
                if ticks % HEARTBEAT_PERIOD_SECS == 0 {
                    match engine.latest_timestamp().to_datetime() {
                        Some(at) => debug!(
                            "Daemon heartbeat: running, last cycle at {}",
                            at.format("%Y-%m-%d %H:%M:%S%.3f")
                        ),
                        None => debug!("Daemon heartbeat: running, no cycle yet"),
                    }
                }
                ticks += 1;
                time::sleep(Duration::from_secs(1)).await;
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Launch the Modbus gateway
    ///
    /// Binds the configured address before returning, so that a busy port is
    /// reported to the caller. The gateway runs until the daemon's `running`
    /// flag is cleared.
    async fn start_modbus_server(
        &mut self,
        config: &Config,
        engine: &Arc<MonitorEngine>,
    ) -> Result<()> {
        let bind = format!("{}:{}", config.modbus.address, config.modbus.port);
        info!("Starting modbus server on {}", bind);

        let listener = TcpListener::bind(&bind)
            .await
            .with_context(|| format!("Failed to bind Modbus gateway to {}", bind))?;
        self.modbus_addr = listener.local_addr().ok();

        let running = self.running.clone();
        let engine = engine.clone();
        let task = tokio::spawn(async move {
            let server_handle = tokio::spawn(async move {
                if let Err(e) = modbus::serve(listener, engine).await {
                    log::error!("Modbus server error: {}", e);
                }
            });

            while running.load(Ordering::SeqCst) {
                time::sleep(Duration::from_secs(1)).await;
            }

            info!("Shutting down Modbus server...");
            server_handle.abort();

            match time::timeout(Duration::from_secs(5), server_handle).await {
                Ok(_) => info!("Modbus server shut down successfully"),
                Err(_) => warn!("Modbus server shutdown timed out, forcing termination"),
            }

            Ok(())
        });

        self.tasks.push(task);
        info!("Modbus server started");
        Ok(())
    }

    /// Signal all tasks to stop
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for all tasks to complete
    ///
    /// Consumes the daemon. Call [`Daemon::shutdown`] first. A task that
    /// panicked or does not stop within 5 seconds is logged and skipped.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(Err(e))) => log::error!("Task failed: {}", e),
                Ok(Err(e)) => log::error!("Task panicked: {}", e),
                Ok(Ok(Ok(()))) => {}
                Err(_) => {
                    log::warn!("Task did not complete within timeout period, may be hung");
                }
            }
        }
        Ok(())
    }
}
