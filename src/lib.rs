// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust BPM monitor library
//!
//! Register-dispatch and derived-measurement engine of a beam-position / RF
//! monitor board. A front end reads and writes numbered registers addressed by
//! `(offset, channel)` and reads calibrated waveforms captured on hardware
//! triggers; [`engine::MonitorEngine`] serves both from one owned context.

pub mod acquisition;
pub mod address;
pub mod board;
pub mod calibration;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod measurement;
pub mod modbus;
pub mod registers;
pub mod waveform;

pub use address::{Address, AddressKind};
pub use engine::MonitorEngine;
pub use error::{MonitorError, MonitorResult};
