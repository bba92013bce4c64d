// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register addressing
//!
//! An [`Address`] names one register of the board: a numeric `offset`
//! selecting the measurement or control action, and a `channel` selecting the
//! physical signal within its category. Addresses are built by the front end
//! and passed by value.

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};

/// Number of RF amplitude/phase channels
pub const RF_CHANNELS: u16 = 8;

/// Number of pickup electrode channels (two BPMs with four electrodes each)
pub const ELECTRODE_CHANNELS: u16 = 8;

/// Number of beam position channels (X1, Y1, X2, Y2)
pub const POSITION_CHANNELS: u16 = 4;

/// Kind of register an address refers to.
///
/// `Register`, `Amplitude`, `Phase` and `Power` are the scalar flavours, they
/// differ only in how offset 0 is interpreted and in the power conversion
/// applied to `Power` reads. `Waveform` addresses go through waveform
/// extraction instead of the scalar dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    Register,
    Amplitude,
    Phase,
    Power,
    Waveform,
}

impl AddressKind {
    /// True for every flavour handled by the scalar dispatcher
    pub fn is_scalar(self) -> bool {
        !matches!(self, AddressKind::Waveform)
    }
}

/// Channel categories with a fixed cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCategory {
    Rf,
    Electrode,
    Position,
}

impl ChannelCategory {
    /// Number of channels in this category
    pub fn cardinality(self) -> u16 {
        match self {
            ChannelCategory::Rf => RF_CHANNELS,
            ChannelCategory::Electrode => ELECTRODE_CHANNELS,
            ChannelCategory::Position => POSITION_CHANNELS,
        }
    }

    /// Check `channel` against the category cardinality
    pub fn validate(self, channel: u16) -> MonitorResult<usize> {
        let limit = self.cardinality();
        if channel < limit {
            Ok(channel as usize)
        } else {
            Err(MonitorError::OutOfRangeChannel {
                channel,
                category: self,
                limit,
            })
        }
    }
}

/// Address of one register: `{kind, offset, channel}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub kind: AddressKind,
    pub offset: u16,
    pub channel: u16,
}

impl Address {
    pub const fn new(kind: AddressKind, offset: u16, channel: u16) -> Self {
        Self {
            kind,
            offset,
            channel,
        }
    }

    /// Scalar register address
    pub const fn register(offset: u16, channel: u16) -> Self {
        Self::new(AddressKind::Register, offset, channel)
    }

    /// Waveform address; waveform routes ignore the channel
    pub const fn waveform(offset: u16) -> Self {
        Self::new(AddressKind::Waveform, offset, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_validation() {
        assert_eq!(ChannelCategory::Rf.validate(7).unwrap(), 7);
        assert!(ChannelCategory::Rf.validate(8).is_err());
        assert_eq!(ChannelCategory::Position.validate(3).unwrap(), 3);
        assert!(matches!(
            ChannelCategory::Position.validate(4),
            Err(MonitorError::OutOfRangeChannel { limit: 4, .. })
        ));
    }

    #[test]
    fn test_scalar_kinds() {
        assert!(AddressKind::Power.is_scalar());
        assert!(AddressKind::Register.is_scalar());
        assert!(!AddressKind::Waveform.is_scalar());
    }
}
