// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scalar read table
//!
//! `Vabcd(n)` below is the voltage of pickup electrode *n*; electrodes 0 to 3
//! belong to BPM 1 and 4 to 7 to BPM 2, with the pairs (0,2), (1,3), (4,6)
//! and (5,7) facing each other.

use std::collections::HashMap;

use crate::address::{Address, AddressKind, ChannelCategory};
use crate::board::AcquisitionBoard;
use crate::error::MonitorResult;
use crate::measurement::{counts_to_vrms, DerivedScalarCache};

/// Electrode pairs used by the difference, sum and ratio registers
const ELECTRODE_PAIRS: [(usize, usize); 4] = [(0, 2), (1, 3), (4, 6), (5, 7)];

/// Quantity served by a scalar read offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarRead {
    /// Offset 0: phase for `Phase` addresses, amplitude otherwise
    RfSnapshot,
    DigitalInput,
    FpgaLed(usize),
    HistoryReady,
    ElectrodeVoltage,
    /// Offset 6
    BpmPhase,
    XyPosition,
    ElectrodeSum,
    XyProtect,
    PairDifference(usize, usize),
    /// Sum of four electrodes starting at the given one
    QuadSum(usize),
    PairSum(usize, usize),
    NormalizedDifference(usize, usize),
    ElectrodeVrms,
    PairDifferenceVrms(usize, usize),
    /// Offset 29
    Position,
    AdcClockState,
    SumProtect,
    /// Offsets 32 and 33, mean over three RF channels
    PhaseMean([usize; 3]),
    AverageVoltage,
    WhiteRabbitStatus,
}

/// State a read can depend on
pub struct ReadContext<'a> {
    pub board: &'a dyn AcquisitionBoard,
    pub derived: &'a DerivedScalarCache,
    pub pulsed: bool,
}

impl ReadContext<'_> {
    fn vabcd(&self, electrode: usize) -> i64 {
        self.board.electrode_voltage(electrode) as i64
    }
}

/// Build the offset → quantity table
pub fn read_table() -> HashMap<u16, ScalarRead> {
    use ScalarRead::*;

    let mut table = HashMap::from([
        (0, RfSnapshot),
        (1, DigitalInput),
        (2, FpgaLed(0)),
        (3, FpgaLed(1)),
        (4, HistoryReady),
        (5, ElectrodeVoltage),
        (6, BpmPhase),
        (7, XyPosition),
        (8, ElectrodeSum),
        (9, XyProtect),
        (14, QuadSum(0)),
        (15, QuadSum(4)),
        (24, ElectrodeVrms),
        (29, Position),
        (30, AdcClockState),
        (31, SumProtect),
        (32, PhaseMean([1, 2, 3])),
        (33, PhaseMean([5, 6, 7])),
        (34, AverageVoltage),
        (93, WhiteRabbitStatus),
    ]);

    for (k, &(a, c)) in ELECTRODE_PAIRS.iter().enumerate() {
        let k = k as u16;
        table.insert(10 + k, PairDifference(a, c));
        table.insert(16 + k, PairSum(a, c));
        table.insert(20 + k, NormalizedDifference(a, c));
        table.insert(25 + k, PairDifferenceVrms(a, c));
    }

    table
}

/// Wrap a phase in degrees into [−180, 180]
pub fn wrap_phase(phase: f32) -> f32 {
    if phase > 180.0 {
        phase - 360.0
    } else if phase < -180.0 {
        phase + 360.0
    } else {
        phase
    }
}

impl ScalarRead {
    /// Evaluate the quantity for `address`
    pub fn evaluate(self, address: &Address, ctx: &ReadContext<'_>) -> MonitorResult<f32> {
        use ScalarRead::*;

        let board = ctx.board;
        let channel = address.channel;

        let value = match self {
            RfSnapshot => {
                let reading = board.rf_snapshot(ChannelCategory::Rf.validate(channel)?);
                if address.kind == AddressKind::Phase {
                    reading.phase
                } else {
                    reading.amplitude
                }
            }
            DigitalInput => board.digital_input(ChannelCategory::Rf.validate(channel)?) as f32,
            FpgaLed(led) => board.fpga_led(led) as f32,
            HistoryReady => board.history_storage_ready() as f32,
            ElectrodeVoltage => ctx.vabcd(ChannelCategory::Electrode.validate(channel)?) as f32,
            BpmPhase => bpm_phase(channel, ctx)?,
            XyPosition => board.xy_position(ChannelCategory::Position.validate(channel)?) as f32,
            ElectrodeSum => {
                board.electrode_sum(ChannelCategory::Electrode.validate(channel)?) as f32
            }
            XyProtect => {
                board.xy_protect_status(ChannelCategory::Position.validate(channel)?) as f32
            }
            PairDifference(a, c) => (ctx.vabcd(a) - ctx.vabcd(c)) as f32,
            QuadSum(first) => (first..first + 4).map(|e| ctx.vabcd(e)).sum::<i64>() as f32,
            PairSum(a, c) => (ctx.vabcd(a) + ctx.vabcd(c)) as f32,
            NormalizedDifference(a, c) => {
                let sum = ctx.vabcd(a) + ctx.vabcd(c);
                if sum == 0 {
                    0.0
                } else {
                    (ctx.vabcd(a) - ctx.vabcd(c)) as f32 / sum as f32
                }
            }
            ElectrodeVrms => {
                counts_to_vrms(ctx.vabcd(ChannelCategory::Electrode.validate(channel)?) as f32)
            }
            PairDifferenceVrms(a, c) => counts_to_vrms((ctx.vabcd(a) - ctx.vabcd(c)) as f32),
            Position => {
                let ch = ChannelCategory::Position.validate(channel)?;
                if ctx.pulsed {
                    ctx.derived.average_position(ch)? / 1000.0
                } else {
                    board.xy_position(ch) as f32 / 1e6
                }
            }
            AdcClockState => board.adc_clock_state() as f32,
            SumProtect => {
                board.sum_protect_status(ChannelCategory::Electrode.validate(channel)?) as f32
            }
            PhaseMean(channels) => {
                let mut sum = 0.0;
                for ch in channels {
                    sum += if ctx.pulsed {
                        ctx.derived.flattop_phase(ch)?
                    } else {
                        board.bpm_phase(ch)
                    };
                }
                sum / 3.0
            }
            AverageVoltage => ctx.derived.average_voltage(channel as usize)?,
            WhiteRabbitStatus => {
                board.white_rabbit_status(ChannelCategory::Rf.validate(channel)?) as f32
            }
        };

        Ok(value)
    }
}

/// Offset 6: channels 2 to 9 carry the phase of RF channels 0 to 7.
///
/// In CW mode the FPGA BPM phase is returned. In pulsed mode channels 0 and 1
/// return the live RF phase and the others the flattop phase, wrapped.
fn bpm_phase(channel: u16, ctx: &ReadContext<'_>) -> MonitorResult<f32> {
    if ctx.pulsed && channel < 2 {
        return Ok(ctx.board.rf_snapshot(channel as usize).phase);
    }

    let rf = ChannelCategory::Rf.validate(channel.wrapping_sub(2))?;
    if ctx.pulsed {
        Ok(wrap_phase(ctx.derived.flattop_phase(rf)?))
    } else {
        Ok(ctx.board.bpm_phase(rf))
    }
}
