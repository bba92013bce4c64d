// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Waveform extraction
//!
//! Every waveform offset is resolved through a route table built once at
//! startup. A route names the board source, the unit transform, the channel
//! buffer that keeps a copy and the derived value the waveform feeds.
//!
//! | Offsets | Source | Transform | Derived value |
//! |---------|--------|-----------|---------------|
//! | 1–8 | ADC bank, ch `offset − 1` | none | |
//! | 11–18 | processed bank, ch `2i` | counts → Vrms | average voltage *i* |
//! | 21–28 | processed bank, ch `2i + 1` | none | flattop phase *i* |
//! | 31–38 | history, ch `2i` | counts → Vrms | |
//! | 41–48 | history, ch `2i + 1` | none | |
//! | 61–64 | processed bank, ch `16 + j` | µm → mm | average position *j* |
//! | 65–66 | processed bank, ch 20/21 | none | |
//! | 81–84 | history, ch `16 + j` | µm → mm | |
//! | 85–86 | history, ch 20/21 | none | |
//!
//! Extraction never touches the derived-scalar cache itself, it returns the
//! [`CacheEffect`] for the caller to apply.

pub mod buffers;

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::address::{Address, POSITION_CHANNELS, RF_CHANNELS};
use crate::board::{AcquisitionBoard, TriggerBank};
use crate::error::{MonitorError, MonitorResult};
use crate::measurement::{counts_to_vrms, microns_to_mm, CacheEffect};

pub use buffers::{BufferId, ChannelBuffers, ChannelWaveformBuffer, HISTORY_CAPACITY, LIVE_CAPACITY};

/// Where the samples of a waveform come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSource {
    Trigger(TriggerBank, usize),
    History(usize),
}

impl SampleSource {
    fn capacity(self) -> usize {
        match self {
            SampleSource::Trigger(..) => LIVE_CAPACITY,
            SampleSource::History(_) => HISTORY_CAPACITY,
        }
    }
}

/// Unit conversion applied sample by sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Identity,
    CountsToVrms,
    MicronsToMm,
}

impl Transform {
    pub fn apply(self, sample: f32) -> f32 {
        match self {
            Transform::Identity => sample,
            Transform::CountsToVrms => counts_to_vrms(sample),
            Transform::MicronsToMm => microns_to_mm(sample),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformRoute {
    pub source: SampleSource,
    pub transform: Transform,
    pub buffer: Option<BufferId>,
    pub effect: CacheEffect,
}

impl WaveformRoute {
    const fn passthrough(source: SampleSource) -> Self {
        Self {
            source,
            transform: Transform::Identity,
            buffer: None,
            effect: CacheEffect::None,
        }
    }
}

/// Result of one extraction
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub samples: Vec<f32>,
    pub effect: CacheEffect,
}

/// Build the offset → route table
pub fn route_table() -> HashMap<u16, WaveformRoute> {
    use SampleSource::{History, Trigger};
    use TriggerBank::{Adc, Processed};

    let mut routes = HashMap::new();

    for i in 0..RF_CHANNELS as usize {
        let offset = i as u16;
        routes.insert(1 + offset, WaveformRoute::passthrough(Trigger(Adc, i)));
        routes.insert(
            11 + offset,
            WaveformRoute {
                source: Trigger(Processed, 2 * i),
                transform: Transform::CountsToVrms,
                buffer: Some(BufferId::LiveAmplitude(i)),
                effect: CacheEffect::AverageVoltage(i),
            },
        );
        routes.insert(
            21 + offset,
            WaveformRoute {
                source: Trigger(Processed, 2 * i + 1),
                transform: Transform::Identity,
                buffer: Some(BufferId::LivePhase(i)),
                effect: CacheEffect::FlattopPhase(i),
            },
        );
        routes.insert(
            31 + offset,
            WaveformRoute {
                source: History(2 * i),
                transform: Transform::CountsToVrms,
                buffer: Some(BufferId::HistoryAmplitude(i)),
                effect: CacheEffect::None,
            },
        );
        routes.insert(
            41 + offset,
            WaveformRoute {
                source: History(2 * i + 1),
                transform: Transform::Identity,
                buffer: Some(BufferId::HistoryPhase(i)),
                effect: CacheEffect::None,
            },
        );
    }

    for j in 0..POSITION_CHANNELS as usize {
        let offset = j as u16;
        routes.insert(
            61 + offset,
            WaveformRoute {
                source: Trigger(Processed, 16 + j),
                transform: Transform::MicronsToMm,
                buffer: Some(BufferId::LivePosition(j)),
                effect: CacheEffect::AveragePosition(j),
            },
        );
        routes.insert(
            81 + offset,
            WaveformRoute {
                source: History(16 + j),
                transform: Transform::MicronsToMm,
                buffer: Some(BufferId::HistoryPosition(j)),
                effect: CacheEffect::None,
            },
        );
    }

    for (k, channel) in [20usize, 21].into_iter().enumerate() {
        let offset = k as u16;
        routes.insert(65 + offset, WaveformRoute::passthrough(Trigger(Processed, channel)));
        routes.insert(85 + offset, WaveformRoute::passthrough(History(channel)));
    }

    routes
}

/// Reads waveforms from the board and keeps a copy per channel
pub struct WaveformExtractor {
    board: Arc<dyn AcquisitionBoard>,
    routes: HashMap<u16, WaveformRoute>,
    buffers: ChannelBuffers,
}

impl WaveformExtractor {
    pub fn new(board: Arc<dyn AcquisitionBoard>) -> Self {
        Self {
            board,
            routes: route_table(),
            buffers: ChannelBuffers::new(),
        }
    }

    pub fn route(&self, offset: u16) -> Option<&WaveformRoute> {
        self.routes.get(&offset)
    }

    /// Last samples stored in a channel buffer
    pub fn buffer(&self, id: BufferId) -> Option<Vec<f32>> {
        self.buffers.get(id).map(ChannelWaveformBuffer::snapshot)
    }

    /// Read, convert and store the waveform at `address.offset`
    pub fn extract(&self, address: &Address) -> MonitorResult<Extracted> {
        let route = self
            .routes
            .get(&address.offset)
            .ok_or(MonitorError::InvalidAddress {
                kind: address.kind,
                offset: address.offset,
            })?;

        let raw = match route.source {
            SampleSource::Trigger(bank, channel) => self.board.raw_waveform(bank, channel),
            SampleSource::History(channel) => self.board.history_waveform(channel),
        };

        let capacity = route
            .buffer
            .map(BufferId::capacity)
            .unwrap_or_else(|| route.source.capacity());
        let samples: Vec<f32> = raw
            .into_iter()
            .take(capacity)
            .map(|s| route.transform.apply(s))
            .collect();

        if let Some(buffer) = route.buffer.and_then(|id| self.buffers.get(id)) {
            buffer.store(&samples);
        }

        debug!(
            "Extracted waveform {} from {:?} ({} samples)",
            address.offset,
            route.source,
            samples.len()
        );

        Ok(Extracted {
            samples,
            effect: route.effect,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::MockAcquisitionBoard;
    use mockall::predicate::eq;

    #[test]
    fn test_route_table_coverage() {
        let routes = route_table();
        let expected: Vec<u16> = (1..=8)
            .chain(11..=18)
            .chain(21..=28)
            .chain(31..=38)
            .chain(41..=48)
            .chain(61..=66)
            .chain(81..=86)
            .collect();
        assert_eq!(routes.len(), expected.len());
        for offset in expected {
            assert!(routes.contains_key(&offset), "missing offset {offset}");
        }

        assert_eq!(
            routes[&23].source,
            SampleSource::Trigger(TriggerBank::Processed, 5)
        );
        assert_eq!(routes[&84].source, SampleSource::History(19));
        assert_eq!(routes[&64].effect, CacheEffect::AveragePosition(3));
    }

    #[test]
    fn test_amplitude_route_scales_and_stores() {
        let mut board = MockAcquisitionBoard::new();
        board
            .expect_raw_waveform()
            .with(eq(TriggerBank::Processed), eq(4))
            .times(1)
            .returning(|_, _| vec![1.28e6, 0.0, -1.28e6]);

        let extractor = WaveformExtractor::new(Arc::new(board));
        let extracted = extractor.extract(&Address::waveform(13)).unwrap();

        let sqrt2 = std::f32::consts::SQRT_2;
        assert!((extracted.samples[0] - sqrt2).abs() < 1e-6);
        assert_eq!(extracted.samples[1], 0.0);
        assert!((extracted.samples[2] + sqrt2).abs() < 1e-6);
        assert_eq!(extracted.effect, CacheEffect::AverageVoltage(2));
        assert_eq!(
            extractor.buffer(BufferId::LiveAmplitude(2)).unwrap(),
            extracted.samples
        );
    }

    #[test]
    fn test_live_waveform_truncated() {
        let mut board = MockAcquisitionBoard::new();
        board
            .expect_raw_waveform()
            .returning(|_, _| vec![1.0; LIVE_CAPACITY + 500]);

        let extractor = WaveformExtractor::new(Arc::new(board));
        let extracted = extractor.extract(&Address::waveform(3)).unwrap();
        assert_eq!(extracted.samples.len(), LIVE_CAPACITY);
        assert_eq!(extracted.effect, CacheEffect::None);
    }

    #[test]
    fn test_unknown_offset() {
        let board = MockAcquisitionBoard::new();
        let extractor = WaveformExtractor::new(Arc::new(board));
        assert!(matches!(
            extractor.extract(&Address::waveform(50)),
            Err(MonitorError::InvalidAddress { offset: 50, .. })
        ));
    }
}
