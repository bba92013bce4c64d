// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Recorded RF data replay
//!
//! The simulated board can play back RF readings recorded from a real
//! station instead of generating them. A recording is a comma-delimited text
//! file without header, one frame per line:
//!
//! ```text
//! # timestamp, ch0_amp, ch0_phase, ch1_amp, ch1_phase, ..., ch7_amp, ch7_phase
//! 0.000, 20000, 30.0, 19950, 40.0, ...
//! ```
//!
//! Lines starting with `#` are comments. Amplitudes are in ADC counts, phases
//! in degrees and timestamps in seconds from the start of the recording.
//! Malformed lines are skipped.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::RfReading;
use crate::address::RF_CHANNELS;
use crate::error::{MonitorError, MonitorResult};

/// Slowest playback speed, in frames per capture
pub const MIN_SPEED: f64 = 0.1;

/// Fastest playback speed, in frames per capture
pub const MAX_SPEED: f64 = 10.0;

/// Fields of one recorded line: the timestamp then amplitude/phase pairs
const FIELDS_PER_FRAME: usize = 1 + 2 * RF_CHANNELS as usize;

/// One recorded frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReplayFrame {
    /// Seconds from the start of the recording
    pub timestamp: f64,
    pub readings: [RfReading; RF_CHANNELS as usize],
}

/// Replay settings of the simulated board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Recording to play
    pub path: PathBuf,

    /// Start again from the first frame after the last one
    pub loop_mode: bool,

    /// Frames advanced per capture marker
    pub speed: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("resources/rf_recording.csv"),
            loop_mode: true,
            speed: 1.0,
        }
    }
}

/// Cursor over a loaded recording.
///
/// The board advances the cursor once per capture marker so every channel
/// read within one trigger cycle sees the same frame.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    path: PathBuf,
    frames: Vec<ReplayFrame>,
    cursor: f64,
    speed: f64,
    loop_mode: bool,
    paused: bool,
}

impl ReplaySource {
    /// Load the recording at `path`
    ///
    /// # Errors
    ///
    /// [`MonitorError::ReplayFile`] if the file cannot be opened or holds no
    /// valid frame.
    pub fn load<P: AsRef<Path>>(path: P) -> MonitorResult<Self> {
        let path = path.as_ref();
        let replay_error = |reason: String| MonitorError::ReplayFile {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| replay_error(e.to_string()))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut frames = Vec::new();
        for (line, record) in reader.records().enumerate() {
            match record.map_err(|e| e.to_string()).and_then(|r| parse_frame(&r)) {
                Ok(frame) => frames.push(frame),
                Err(reason) => warn!("Skipping replay frame {} of {:?}: {}", line, path, reason),
            }
        }

        if frames.is_empty() {
            return Err(replay_error("no valid frame".to_string()));
        }

        let duration = frames.last().map(|f| f.timestamp).unwrap_or_default();
        info!(
            "Loaded {} replay frames from {:?} ({:.1} s)",
            frames.len(),
            path,
            duration
        );
        Ok(Self {
            path: path.to_path_buf(),
            frames,
            cursor: 0.0,
            speed: 1.0,
            loop_mode: true,
            paused: false,
        })
    }

    /// Load the recording named by `config` and apply its playback settings
    pub fn from_config(config: &ReplayConfig) -> MonitorResult<Self> {
        let mut source = Self::load(&config.path)?;
        source.set_loop_mode(config.loop_mode);
        source.set_speed(config.speed);
        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the frame currently served
    pub fn position(&self) -> usize {
        (self.cursor as usize).min(self.frames.len().saturating_sub(1))
    }

    pub fn current(&self) -> &ReplayFrame {
        &self.frames[self.position()]
    }

    /// Reading of `channel` in the current frame
    pub fn reading(&self, channel: usize) -> Option<RfReading> {
        self.current().readings.get(channel).copied()
    }

    /// Move to the next frame according to speed, pause and loop mode
    pub fn advance(&mut self) {
        if self.paused {
            return;
        }
        let len = self.frames.len() as f64;
        self.cursor += self.speed;
        if self.cursor >= len {
            if self.loop_mode {
                self.cursor %= len;
                debug!("Replay of {:?} looped", self.path);
            } else {
                self.cursor = len - 1.0;
            }
        }
    }

    pub fn rewind(&mut self) {
        self.cursor = 0.0;
    }

    /// Jump to `fraction` of the recording, clamped to [0, 1]
    pub fn seek(&mut self, fraction: f64) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let index = ((fraction * self.frames.len() as f64) as usize)
            .min(self.frames.len().saturating_sub(1));
        self.cursor = index as f64;
        debug!("Replay seeked to frame {}", index);
    }

    /// Fraction of the recording already played
    pub fn progress(&self) -> f64 {
        self.position() as f64 / self.frames.len() as f64
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Set the playback speed, clamped to [`MIN_SPEED`, `MAX_SPEED`]
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = if speed.is_nan() {
            1.0
        } else {
            speed.clamp(MIN_SPEED, MAX_SPEED)
        };
        info!("Replay speed set to {:.2}x", self.speed);
    }

    pub fn loop_mode(&self) -> bool {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, loop_mode: bool) {
        self.loop_mode = loop_mode;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        info!("Replay {}", if paused { "paused" } else { "resumed" });
    }
}

fn parse_frame(record: &csv::StringRecord) -> Result<ReplayFrame, String> {
    if record.len() < FIELDS_PER_FRAME {
        return Err(format!(
            "{} fields, expected {}",
            record.len(),
            FIELDS_PER_FRAME
        ));
    }
    let field = |index: usize| -> Result<f64, String> {
        record[index]
            .parse::<f64>()
            .map_err(|e| format!("field {}: {}", index, e))
    };

    let mut frame = ReplayFrame {
        timestamp: field(0)?,
        ..ReplayFrame::default()
    };
    for (channel, reading) in frame.readings.iter_mut().enumerate() {
        reading.amplitude = field(1 + 2 * channel)? as f32;
        reading.phase = field(2 + 2 * channel)? as f32;
    }
    Ok(frame)
}
