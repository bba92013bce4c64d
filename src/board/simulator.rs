// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated acquisition board
//!
//! This module provides a board backend that generates the signals of a pulsed
//! RF station without any hardware:
//! - Trapezoidal amplitude pulses with uniform or Gaussian noise on every RF
//!   channel
//! - Flat phases with jitter, one 10° step per channel
//! - Beam positions following the pulse envelope
//! - A White-Rabbit clock advancing on every capture marker latch
//! - History captures becoming ready after a configurable number of polls
//!
//! RF levels can come from a recording instead ([`ReplaySource`]), advanced
//! one frame per capture marker, and any RF channel can be corrupted with
//! the faults of [`FaultType`].
//!
//! The board also exposes test controls to override any signal, pin the raw
//! timestamp or make history captures hang, and counters to verify which
//! primitives the engine invoked.

use std::collections::{BTreeMap, HashMap};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::faults::{FaultConfig, FaultStatistic, FaultType, SignalRole};
use super::replay::{ReplayFrame, ReplaySource};
use super::{AcquisitionBoard, RawTimestamp, RfReading, TriggerBank};
use crate::acquisition::timestamp::{TICKS_PER_SECOND, TIMEZONE_OFFSET_SECONDS};
use crate::config::board::{NoiseModel, SimulatorConfig};

/// Processed-bank channel of position X1, followed by Y1, X2 and Y2
const FIRST_POSITION_CHANNEL: usize = 16;

/// Number of channels of the processed bank and of the history memory
const PROCESSED_CHANNELS: usize = 22;

/// Number of raw ADC channels
const ADC_CHANNELS: usize = 8;

/// Counters of the primitives invoked on the simulated board
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimulatorStats {
    pub trigger_polls: u64,
    pub capture_markers: u64,
    pub history_triggers: u64,
    pub control_writes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WaveformKey {
    Trigger(TriggerBank, usize),
    History(usize),
}

impl WaveformKey {
    /// RF channel and role carried by the frame, `None` for positions and
    /// diagnostics
    fn signal(self) -> Option<(usize, SignalRole)> {
        match self {
            WaveformKey::Trigger(TriggerBank::Adc, ch) if ch < ADC_CHANNELS => {
                Some((ch, SignalRole::Amplitude))
            }
            WaveformKey::Trigger(TriggerBank::Processed, ch) | WaveformKey::History(ch)
                if ch < FIRST_POSITION_CHANNEL =>
            {
                let role = if ch % 2 == 0 {
                    SignalRole::Amplitude
                } else {
                    SignalRole::Phase
                };
                Some((ch / 2, role))
            }
            _ => None,
        }
    }
}

struct ActiveFault {
    config: FaultConfig,
    triggers: u64,
    frozen_frames: HashMap<WaveformKey, Vec<f32>>,
    frozen_reading: Option<RfReading>,
}

impl ActiveFault {
    fn new(config: FaultConfig) -> Self {
        Self {
            config,
            triggers: 0,
            frozen_frames: HashMap::new(),
            frozen_reading: None,
        }
    }
}

struct SimulatorState {
    rng: StdRng,
    clock: RawTimestamp,
    latched: RawTimestamp,
    pinned_timestamp: Option<RawTimestamp>,
    history_countdown: Option<u32>,
    history_never_ready: bool,
    waveforms: HashMap<WaveformKey, Vec<f32>>,
    rf_readings: HashMap<usize, RfReading>,
    electrodes: HashMap<usize, i32>,
    controls: HashMap<String, f64>,
    faults: BTreeMap<(usize, FaultType), ActiveFault>,
    replay: Option<ReplaySource>,
}

impl SimulatorState {
    fn corrupt_frame(&mut self, key: WaveformKey, mut samples: Vec<f32>) -> Vec<f32> {
        let Some((rf_channel, role)) = key.signal() else {
            return samples;
        };
        for (&(channel, fault), active) in self.faults.iter_mut() {
            if channel != rf_channel || !active.config.fires(&mut self.rng) {
                continue;
            }
            active.triggers += 1;
            debug!("Simulated {} fault on {:?}", fault, key);
            if fault == FaultType::Stuck {
                samples = active
                    .frozen_frames
                    .entry(key)
                    .or_insert_with(|| samples.clone())
                    .clone();
            } else {
                active
                    .config
                    .apply_samples(role, &mut samples, &mut self.rng, active.triggers);
            }
        }
        samples
    }

    fn corrupt_reading(&mut self, rf_channel: usize, mut reading: RfReading) -> RfReading {
        for (&(channel, fault), active) in self.faults.iter_mut() {
            if channel != rf_channel || !active.config.fires(&mut self.rng) {
                continue;
            }
            active.triggers += 1;
            if fault == FaultType::Stuck {
                reading = *active.frozen_reading.get_or_insert(reading);
            } else {
                active
                    .config
                    .apply_reading(&mut reading, &mut self.rng, active.triggers);
            }
        }
        reading
    }
}

/// Software board generating pulse-shaped signals
pub struct SimulatedBoard {
    config: SimulatorConfig,
    state: Mutex<SimulatorState>,
    trigger_polls: AtomicU64,
    capture_markers: AtomicU64,
    history_triggers: AtomicU64,
    control_writes: AtomicU64,
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl SimulatedBoard {
    pub fn new(config: SimulatorConfig) -> Self {
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        debug!("Simulated board seeded with {}", seed);

        let clock = RawTimestamp {
            tai_seconds: chrono::Utc::now().timestamp() + TIMEZONE_OFFSET_SECONDS,
            tai_ticks: 0,
        };

        let faults = config
            .faults
            .iter()
            .map(|fault| ((fault.channel, fault.fault), ActiveFault::new(*fault)))
            .collect();

        Self {
            config,
            state: Mutex::new(SimulatorState {
                rng: StdRng::seed_from_u64(seed),
                clock,
                latched: clock,
                pinned_timestamp: None,
                history_countdown: None,
                history_never_ready: false,
                waveforms: HashMap::new(),
                rf_readings: HashMap::new(),
                electrodes: HashMap::new(),
                controls: HashMap::new(),
                faults,
                replay: None,
            }),
            trigger_polls: AtomicU64::new(0),
            capture_markers: AtomicU64::new(0),
            history_triggers: AtomicU64::new(0),
            control_writes: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimulatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the generated samples of a trigger frame channel
    pub fn set_waveform(&self, bank: TriggerBank, channel: usize, samples: Vec<f32>) {
        self.state()
            .waveforms
            .insert(WaveformKey::Trigger(bank, channel), samples);
    }

    /// Replace the generated samples of a history channel
    pub fn set_history_waveform(&self, channel: usize, samples: Vec<f32>) {
        self.state()
            .waveforms
            .insert(WaveformKey::History(channel), samples);
    }

    /// Pin the RF snapshot of a channel
    pub fn set_rf_reading(&self, channel: usize, reading: RfReading) {
        self.state().rf_readings.insert(channel, reading);
    }

    /// Pin the voltage of one electrode, in ADC counts
    pub fn set_electrode_voltage(&self, channel: usize, counts: i32) {
        self.state().electrodes.insert(channel, counts);
    }

    /// Pin the raw timestamp returned by the board, `None` restores the clock
    pub fn set_raw_timestamp(&self, timestamp: Option<RawTimestamp>) {
        self.state().pinned_timestamp = timestamp;
    }

    /// Fault injection: history captures never become ready
    pub fn set_history_never_ready(&self, never_ready: bool) {
        self.state().history_never_ready = never_ready;
    }

    /// Attach a fault to an RF channel, replacing the same fault already there
    pub fn inject_fault(&self, fault: FaultConfig) {
        info!(
            "Simulated board: {} fault on RF channel {} (p = {})",
            fault.fault, fault.channel, fault.probability
        );
        self.state()
            .faults
            .insert((fault.channel, fault.fault), ActiveFault::new(fault));
    }

    pub fn clear_fault(&self, channel: usize, fault: FaultType) {
        if self.state().faults.remove(&(channel, fault)).is_some() {
            info!("Simulated board: {} fault on RF channel {} cleared", fault, channel);
        }
    }

    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// Firing counts of the active faults, by channel then fault
    pub fn fault_statistics(&self) -> Vec<FaultStatistic> {
        self.state()
            .faults
            .iter()
            .map(|(&(channel, fault), active)| FaultStatistic {
                channel,
                fault,
                triggers: active.triggers,
            })
            .collect()
    }

    /// Firings of `fault` summed over the channels
    pub fn fault_triggers(&self, fault: FaultType) -> u64 {
        self.state()
            .faults
            .iter()
            .filter(|((_, kind), _)| *kind == fault)
            .map(|(_, active)| active.triggers)
            .sum()
    }

    pub fn reset_fault_statistics(&self) {
        for active in self.state().faults.values_mut() {
            active.triggers = 0;
        }
    }

    /// Play `source` instead of the generated RF levels, `None` goes back to
    /// the signal model
    pub fn set_replay(&self, source: Option<ReplaySource>) {
        match &source {
            Some(source) => info!(
                "Simulated board replaying {:?} ({} frames)",
                source.path(),
                source.len()
            ),
            None => info!("Simulated board back to generated signals"),
        }
        self.state().replay = source;
    }

    /// Run `f` on the active replay, `None` when nothing is replayed
    pub fn with_replay<T>(&self, f: impl FnOnce(&mut ReplaySource) -> T) -> Option<T> {
        self.state().replay.as_mut().map(f)
    }

    /// Last value written through a control primitive, keyed by primitive name
    /// with the channel in brackets (`"bpm_kxy[4]"`)
    pub fn last_control(&self, name: &str) -> Option<f64> {
        self.state().controls.get(name).copied()
    }

    pub fn stats(&self) -> SimulatorStats {
        SimulatorStats {
            trigger_polls: self.trigger_polls.load(Ordering::Relaxed),
            capture_markers: self.capture_markers.load(Ordering::Relaxed),
            history_triggers: self.history_triggers.load(Ordering::Relaxed),
            control_writes: self.control_writes.load(Ordering::Relaxed),
        }
    }

    /// Drop every override and zero the counters
    pub fn reset(&self) {
        {
            let mut state = self.state();
            state.pinned_timestamp = None;
            state.history_countdown = None;
            state.history_never_ready = false;
            state.waveforms.clear();
            state.rf_readings.clear();
            state.electrodes.clear();
            state.controls.clear();
            state.faults.clear();
            if let Some(replay) = state.replay.as_mut() {
                replay.rewind();
            }
        }
        for counter in [
            &self.trigger_polls,
            &self.capture_markers,
            &self.history_triggers,
            &self.control_writes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        info!("Simulated board reset");
    }

    fn record_control(&self, name: String, value: f64) {
        debug!("Simulated board: {} <- {}", name, value);
        self.control_writes.fetch_add(1, Ordering::Relaxed);
        self.state().controls.insert(name, value);
    }

    fn control(&self, name: &str) -> Option<f64> {
        self.state().controls.get(name).copied()
    }

    /// Trapezoidal pulse envelope in [0, 1]
    fn envelope(&self, index: usize) -> f32 {
        let c = &self.config;
        let rise = c.rise_samples.max(1) as f32;
        if index < c.pulse_start || index >= c.pulse_end {
            return 0.0;
        }
        let from_start = (index - c.pulse_start) as f32;
        let to_end = (c.pulse_end - index) as f32;
        (from_start / rise).min(to_end / rise).min(1.0)
    }

    fn channel_phase(&self, rf_channel: usize) -> f32 {
        self.config.phase_deg + 10.0 * rf_channel as f32
    }

    /// One noise draw of the configured model, scaled by `scale`
    fn noise(&self, rng: &mut StdRng, scale: f32) -> f32 {
        match self.config.noise_model {
            NoiseModel::Uniform => rng.random_range(-0.5f32..0.5) * scale,
            NoiseModel::Gaussian => gaussian(rng) * scale,
        }
    }

    /// Flattop amplitude and phase of an RF channel, from the replayed frame
    /// when there is one
    fn rf_level(&self, rf_channel: usize, replayed: Option<&ReplayFrame>) -> RfReading {
        replayed
            .and_then(|frame| frame.readings.get(rf_channel).copied())
            .unwrap_or(RfReading {
                amplitude: self.config.pulse_amplitude,
                phase: self.channel_phase(rf_channel),
            })
    }

    fn generate(
        &self,
        rng: &mut StdRng,
        channel: usize,
        len: usize,
        adc: bool,
        replayed: Option<&ReplayFrame>,
    ) -> Vec<f32> {
        let c = &self.config;

        if adc {
            if channel >= ADC_CHANNELS {
                return vec![0.0; len];
            }
            let amplitude = self.rf_level(channel, replayed).amplitude;
            let offset = channel as f32 * PI / 4.0;
            return (0..len)
                .map(|i| {
                    let carrier = (2.0 * PI * 0.1 * i as f32 + offset).sin();
                    amplitude
                        * self.envelope(i)
                        * carrier
                        * (1.0 + self.noise(rng, c.noise_level))
                })
                .collect();
        }

        match channel {
            ch if ch < FIRST_POSITION_CHANNEL && ch % 2 == 0 => {
                let amplitude = self.rf_level(ch / 2, replayed).amplitude;
                (0..len)
                    .map(|i| {
                        let level = c.baseline_amplitude
                            + (amplitude - c.baseline_amplitude) * self.envelope(i);
                        level * (1.0 + self.noise(rng, c.noise_level))
                    })
                    .collect()
            }
            ch if ch < FIRST_POSITION_CHANNEL => {
                let phase = self.rf_level(ch / 2, replayed).phase;
                (0..len)
                    .map(|_| phase + self.noise(rng, c.phase_jitter_deg))
                    .collect()
            }
            ch if ch < FIRST_POSITION_CHANNEL + 4 => {
                let position = c.positions_um[ch - FIRST_POSITION_CHANNEL];
                (0..len)
                    .map(|i| {
                        position * self.envelope(i) * (1.0 + self.noise(rng, c.noise_level))
                    })
                    .collect()
            }
            ch if ch < PROCESSED_CHANNELS => (0..len).map(|i| self.envelope(i)).collect(),
            _ => vec![0.0; len],
        }
    }
}

/// Standard normal draw, Box-Muller transform
pub(crate) fn gaussian(rng: &mut StdRng) -> f32 {
    // u1 kept away from 0 for the logarithm
    let u1: f32 = rng.random_range(f32::EPSILON..1.0);
    let u2: f32 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

pub(crate) fn wrap_degrees(phase: f32) -> f32 {
    let mut phase = phase % 360.0;
    if phase > 180.0 {
        phase -= 360.0;
    } else if phase < -180.0 {
        phase += 360.0;
    }
    phase
}

impl AcquisitionBoard for SimulatedBoard {
    fn initialize(&self) {
        info!(
            "Simulated board ready: {} trigger samples, pulse {}..{}",
            self.config.trigger_samples, self.config.pulse_start, self.config.pulse_end
        );
    }

    fn rf_snapshot(&self, channel: usize) -> RfReading {
        let mut guard = self.state();
        let state = &mut *guard;
        let reading = match state.rf_readings.get(&channel) {
            Some(reading) => *reading,
            None => {
                let c = &self.config;
                let level = self.rf_level(channel, state.replay.as_ref().map(|r| r.current()));
                let amplitude = level.amplitude * (1.0 + self.noise(&mut state.rng, c.noise_level));
                let phase = level.phase + self.noise(&mut state.rng, c.phase_jitter_deg);
                RfReading {
                    amplitude,
                    phase: wrap_degrees(phase),
                }
            }
        };
        state.corrupt_reading(channel, reading)
    }

    fn raw_waveform(&self, bank: TriggerBank, channel: usize) -> Vec<f32> {
        let key = WaveformKey::Trigger(bank, channel);
        let mut guard = self.state();
        let state = &mut *guard;
        let samples = match state.waveforms.get(&key) {
            Some(samples) => samples.clone(),
            None => self.generate(
                &mut state.rng,
                channel,
                self.config.trigger_samples,
                bank == TriggerBank::Adc,
                state.replay.as_ref().map(|r| r.current()),
            ),
        };
        state.corrupt_frame(key, samples)
    }

    fn history_waveform(&self, channel: usize) -> Vec<f32> {
        let key = WaveformKey::History(channel);
        let mut guard = self.state();
        let state = &mut *guard;
        let samples = match state.waveforms.get(&key) {
            Some(samples) => samples.clone(),
            None => self.generate(
                &mut state.rng,
                channel,
                self.config.history_samples,
                false,
                state.replay.as_ref().map(|r| r.current()),
            ),
        };
        state.corrupt_frame(key, samples)
    }

    fn raw_timestamp(&self) -> RawTimestamp {
        let state = self.state();
        state.pinned_timestamp.unwrap_or(state.latched)
    }

    fn is_trigger_data_ready(&self) -> bool {
        self.trigger_polls.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn is_history_data_ready(&self) -> bool {
        let mut state = self.state();
        if state.history_never_ready {
            return false;
        }
        match state.history_countdown {
            Some(0) => true,
            Some(n) => {
                state.history_countdown = Some(n - 1);
                false
            }
            None => false,
        }
    }

    fn start_history_capture(&self) {
        self.history_triggers.fetch_add(1, Ordering::Relaxed);
        self.state().history_countdown = Some(self.config.history_ready_after_polls);
        debug!("Simulated board: history capture armed");
    }

    fn latch_capture_marker(&self) {
        self.capture_markers.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state();
        let ticks = state.clock.tai_ticks as u64 + self.config.ticks_per_poll as u64;
        state.clock.tai_seconds += (ticks / TICKS_PER_SECOND) as i64;
        state.clock.tai_ticks = (ticks % TICKS_PER_SECOND) as u32;
        state.latched = state.clock;
        if let Some(replay) = state.replay.as_mut() {
            replay.advance();
        }
    }

    fn history_storage_ready(&self) -> i32 {
        matches!(self.state().history_countdown, Some(0)) as i32
    }

    fn reset_history_storage(&self, value: i32) {
        if value != 0 {
            self.state().history_countdown = None;
        }
        self.record_control("reset_history_storage".into(), value as f64);
    }

    fn digital_input(&self, channel: usize) -> i32 {
        // Outputs are looped back to the inputs
        self.control(&format!("digital_output[{channel}]"))
            .unwrap_or(0.0) as i32
    }

    fn set_digital_output(&self, channel: usize, value: i32) {
        self.record_control(format!("digital_output[{channel}]"), value as f64);
    }

    fn fpga_led(&self, led: usize) -> i32 {
        (led == 0) as i32
    }

    fn set_system_led_enable(&self, value: i32) {
        self.record_control("system_led_enable".into(), value as f64);
    }

    fn set_fan_led_state(&self, value: i32) {
        self.record_control("fan_led_state".into(), value as f64);
    }

    fn set_pulse_output_enable(&self, value: u16) {
        self.record_control("pulse_output_enable".into(), value as f64);
    }

    fn set_internal_trigger_enable(&self, value: i32) {
        self.record_control("internal_trigger_enable".into(), value as f64);
    }

    fn select_trigger_source(&self, value: i32) {
        self.record_control("trigger_source".into(), value as f64);
    }

    fn set_trigger_extract_ratio(&self, ratio: f32) {
        self.record_control("trigger_extract_ratio".into(), ratio as f64);
    }

    fn set_history_extract_ratio(&self, ratio: f32) {
        self.record_control("history_extract_ratio".into(), ratio as f64);
    }

    fn set_iq_start_sync(&self, value: i32) {
        self.record_control("iq_start_sync".into(), value as f64);
    }

    fn electrode_voltage(&self, channel: usize) -> i32 {
        if let Some(counts) = self.state().electrodes.get(&channel) {
            return *counts;
        }
        let base = self.config.electrode_counts;
        base + (channel % 4) as i32 * (base / 20)
    }

    fn electrode_sum(&self, channel: usize) -> i32 {
        let first = (channel % 2) * 4;
        (first..first + 4).map(|e| self.electrode_voltage(e)).sum()
    }

    fn bpm_phase(&self, channel: usize) -> f32 {
        wrap_degrees(self.channel_phase(channel))
    }

    fn xy_position(&self, channel: usize) -> i32 {
        (self.config.positions_um[channel % 4] * 1000.0) as i32
    }

    fn xy_protect_status(&self, _channel: usize) -> i32 {
        0
    }

    fn sum_protect_status(&self, _channel: usize) -> i32 {
        0
    }

    fn adc_clock_state(&self) -> i32 {
        0
    }

    fn white_rabbit_status(&self, _channel: usize) -> i32 {
        1
    }

    fn set_bpm_k1(&self, channel: usize, value: f32) {
        self.record_control(format!("bpm_k1[{channel}]"), value as f64);
    }

    fn set_bpm_k2(&self, channel: usize, value: f32) {
        self.record_control(format!("bpm_k2[{channel}]"), value as f64);
    }

    fn set_bpm_k3(&self, channel: usize, value: f32) {
        self.record_control(format!("bpm_k3[{channel}]"), value as f64);
    }

    fn set_bpm_phase_offset(&self, channel: usize, value: f32) {
        self.record_control(format!("bpm_phase_offset[{channel}]"), value as f64);
    }

    fn set_bpm_kxy(&self, channel: usize, value: i32) {
        self.record_control(format!("bpm_kxy[{channel}]"), value as f64);
    }

    fn set_bpm_xy_offset(&self, channel: usize, value: i32) {
        self.record_control(format!("bpm_xy_offset[{channel}]"), value as f64);
    }

    fn set_bpm_xy_limit(&self, channel: usize, value: i32) {
        self.record_control(format!("bpm_xy_limit[{channel}]"), value as f64);
    }

    fn set_bpm_sum_limit(&self, channel: usize, value: i32) {
        self.record_control(format!("bpm_sum_limit[{channel}]"), value as f64);
    }

    fn set_protect_filter_time(&self, micros: f32) {
        self.record_control("protect_filter_time".into(), micros as f64);
    }

    fn set_dds_frequency_word(&self, value: i32) {
        self.record_control("dds_frequency_word".into(), value as f64);
    }

    fn reset_board(&self, value: i32) {
        self.record_control("reset".into(), value as f64);
    }
}
