// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Cycle timestamps
//!
//! The board reports White-Rabbit time as TAI seconds plus 16 ns ticks. The
//! front end expects seconds since its own epoch (1990-01-01), shifted by the
//! site time zone. [`Timestamp::from_raw`] performs that conversion and
//! [`TimestampLatch`] keeps the raw value of the last trigger cycle.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::board::RawTimestamp;

/// Seconds between the Unix epoch and the front-end epoch (1990-01-01)
pub const EPICS_EPOCH_OFFSET_SECONDS: i64 = 631_152_000;

/// Site time zone offset applied by the White-Rabbit master (UTC+8)
pub const TIMEZONE_OFFSET_SECONDS: i64 = 28_800;

/// Duration of one White-Rabbit tick
pub const NANOS_PER_TICK: u32 = 16;

/// White-Rabbit ticks in one second
pub const TICKS_PER_SECOND: u64 = 1_000_000_000 / NANOS_PER_TICK as u64;

/// Timestamp of an acquisition cycle, relative to the front-end epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl Timestamp {
    /// Convert a raw board time into a cycle timestamp
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_bpm_monitor::acquisition::Timestamp;
    /// use rust_bpm_monitor::board::RawTimestamp;
    ///
    /// let raw = RawTimestamp { tai_seconds: 631_152_000 + 28_800 + 10, tai_ticks: 1 };
    /// let ts = Timestamp::from_raw(raw);
    /// assert_eq!((ts.seconds, ts.nanoseconds), (10, 16));
    /// ```
    pub fn from_raw(raw: RawTimestamp) -> Self {
        Self {
            seconds: raw
                .tai_seconds
                .saturating_sub(EPICS_EPOCH_OFFSET_SECONDS)
                .saturating_sub(TIMEZONE_OFFSET_SECONDS),
            nanoseconds: raw.tai_ticks.saturating_mul(NANOS_PER_TICK),
        }
    }

    /// Wall-clock time of the cycle, `None` if out of chrono's range
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(
            self.seconds.checked_add(EPICS_EPOCH_OFFSET_SECONDS)?,
            self.nanoseconds,
        )
    }
}

impl From<RawTimestamp> for Timestamp {
    fn from(raw: RawTimestamp) -> Self {
        Self::from_raw(raw)
    }
}

/// Raw time of the latest trigger cycle, written by the poller
#[derive(Debug, Default)]
pub struct TimestampLatch {
    raw: RwLock<RawTimestamp>,
}

impl TimestampLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, raw: RawTimestamp) {
        *self.raw.write().unwrap_or_else(|e| e.into_inner()) = raw;
    }

    pub fn latest_raw(&self) -> RawTimestamp {
        *self.raw.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn latest(&self) -> Timestamp {
        Timestamp::from_raw(self.latest_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_conversion() {
        let raw = RawTimestamp {
            tai_seconds: 631_152_000 + 28_800 + 10,
            tai_ticks: 1,
        };
        assert_eq!(
            Timestamp::from_raw(raw),
            Timestamp {
                seconds: 10,
                nanoseconds: 16
            }
        );
    }

    #[test]
    fn test_last_tick_of_second() {
        let raw = RawTimestamp {
            tai_seconds: EPICS_EPOCH_OFFSET_SECONDS + TIMEZONE_OFFSET_SECONDS,
            tai_ticks: (TICKS_PER_SECOND - 1) as u32,
        };
        assert_eq!(Timestamp::from_raw(raw).nanoseconds, 999_999_984);
    }

    #[test]
    fn test_to_datetime() {
        let ts = Timestamp {
            seconds: 0,
            nanoseconds: 0,
        };
        let dt = ts.to_datetime().unwrap();
        assert_eq!(dt.to_rfc3339(), "1990-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_latch() {
        let latch = TimestampLatch::new();
        assert_eq!(latch.latest_raw(), RawTimestamp::default());

        let raw = RawTimestamp {
            tai_seconds: EPICS_EPOCH_OFFSET_SECONDS + TIMEZONE_OFFSET_SECONDS + 3,
            tai_ticks: 10,
        };
        latch.store(raw);
        assert_eq!(latch.latest_raw(), raw);
        assert_eq!(latch.latest().seconds, 3);
        assert_eq!(latch.latest().nanoseconds, 160);
    }
}
