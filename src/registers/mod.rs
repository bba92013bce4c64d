// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scalar register dispatch
//!
//! Scalar offsets are resolved through two tables built once when the engine
//! is created: [`read_table`] for reads and [`write_table`] for writes. An
//! offset absent from a table is an [`InvalidAddress`](crate::error::MonitorError::InvalidAddress).

pub mod read_map;
pub mod write_map;

pub use read_map::{read_table, wrap_phase, ReadContext, ScalarRead};
pub use write_map::{write_table, WindowBound, WriteAction, WriteContext};
