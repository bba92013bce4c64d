// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Acquisition state machine
//!
//! This module drives the board through its acquisition cycles:
//! - [`TriggerPoller`]: periodic check for complete trigger frames, timestamp
//!   latch and trigger-ready notification
//! - [`HistoryCapture`]: bounded, single-flight capture of the long history
//!   record
//! - [`Timestamp`]: conversion of the board's White-Rabbit time into the
//!   front-end epoch
//!
//! Notifications are `tokio::sync::broadcast` channels carrying the cycle
//! [`Timestamp`].

pub mod history;
pub mod poller;
pub mod timestamp;

pub use history::{HistoryCapture, TriggerState};
pub use poller::TriggerPoller;
pub use timestamp::{Timestamp, TimestampLatch};
