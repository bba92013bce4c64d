// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-channel waveform buffers

use std::collections::HashMap;
use std::sync::RwLock;

use crate::address::{POSITION_CHANNELS, RF_CHANNELS};

/// Capacity of a live trigger buffer, in samples
pub const LIVE_CAPACITY: usize = 10_000;

/// Capacity of a history buffer, in samples
pub const HISTORY_CAPACITY: usize = 100_000;

/// Identifies one channel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferId {
    LiveAmplitude(usize),
    LivePhase(usize),
    LivePosition(usize),
    HistoryAmplitude(usize),
    HistoryPhase(usize),
    HistoryPosition(usize),
}

impl BufferId {
    pub fn capacity(self) -> usize {
        match self {
            BufferId::LiveAmplitude(_) | BufferId::LivePhase(_) | BufferId::LivePosition(_) => {
                LIVE_CAPACITY
            }
            _ => HISTORY_CAPACITY,
        }
    }
}

/// Fixed-capacity sample buffer, overwritten in place on every extraction
#[derive(Debug)]
pub struct ChannelWaveformBuffer {
    capacity: usize,
    samples: RwLock<Vec<f32>>,
}

impl ChannelWaveformBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: RwLock::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replace the content with `samples`, truncated to the capacity
    pub fn store(&self, samples: &[f32]) {
        let len = samples.len().min(self.capacity);
        let mut buffer = self.samples.write().unwrap_or_else(|e| e.into_inner());
        buffer.clear();
        buffer.extend_from_slice(&samples[..len]);
    }

    pub fn snapshot(&self) -> Vec<f32> {
        self.samples
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.samples.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All channel buffers, created once at startup
#[derive(Debug)]
pub struct ChannelBuffers {
    buffers: HashMap<BufferId, ChannelWaveformBuffer>,
}

impl Default for ChannelBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBuffers {
    pub fn new() -> Self {
        let rf = (0..RF_CHANNELS as usize).flat_map(|i| {
            [
                BufferId::LiveAmplitude(i),
                BufferId::LivePhase(i),
                BufferId::HistoryAmplitude(i),
                BufferId::HistoryPhase(i),
            ]
        });
        let positions = (0..POSITION_CHANNELS as usize)
            .flat_map(|j| [BufferId::LivePosition(j), BufferId::HistoryPosition(j)]);

        let buffers = rf
            .chain(positions)
            .map(|id| (id, ChannelWaveformBuffer::new(id.capacity())))
            .collect();
        Self { buffers }
    }

    pub fn get(&self, id: BufferId) -> Option<&ChannelWaveformBuffer> {
        self.buffers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_truncates_to_capacity() {
        let buffer = ChannelWaveformBuffer::new(4);
        buffer.store(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(buffer.snapshot(), vec![1.0, 2.0, 3.0, 4.0]);

        buffer.store(&[9.0]);
        assert_eq!(buffer.snapshot(), vec![9.0]);
    }

    #[test]
    fn test_buffer_set() {
        let buffers = ChannelBuffers::new();
        assert_eq!(buffers.len(), 8 * 4 + 4 * 2);
        assert_eq!(
            buffers.get(BufferId::HistoryPhase(7)).unwrap().capacity(),
            HISTORY_CAPACITY
        );
        assert_eq!(
            buffers.get(BufferId::LivePosition(3)).unwrap().capacity(),
            LIVE_CAPACITY
        );
        assert!(buffers.get(BufferId::LivePosition(4)).is_none());
    }
}
