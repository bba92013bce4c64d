// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Hardware board backend
//!
//! Binds the vendor low-level library (`liblowlevel.so`) at link time. Only
//! compiled with the `hardware` cargo feature.

use std::os::raw::{c_int, c_longlong};

use log::{info, warn};

use super::{AcquisitionBoard, RawTimestamp, RfReading, TriggerBank};
use crate::waveform::{HISTORY_CAPACITY, LIVE_CAPACITY};

#[link(name = "lowlevel")]
extern "C" {
    fn SystemInit() -> c_int;
    fn GetRfInfo(channel: c_int, amp: *mut f32, phase: *mut f32);
    fn GetDI(channel: c_int, value: *mut c_int);
    fn SetDO(channel: c_int, value: c_int);
    fn GetFPGA_LED0() -> c_int;
    fn GetFPGA_LED1() -> c_int;
    fn SetArmLedEnable(enable: c_int);
    fn SetFanLedStatus(value: c_int);
    fn SetOutputPulseEnable(value: c_int);
    fn SetInnerTrigEn(value: c_int);
    fn GetStorageDataReady() -> c_int;
    fn SetHistoryTrigger(enable: c_int);
    fn SetRsetDataStorage(enable: c_int);
    fn SetTriggerExtractDataRatio(value: f32);
    fn SetHistoryExtractDataRatio(value: f32);
    fn SetChangeStartIQSig(value: c_int);
    fn GetHistoryChannelData(channel: c_int, data: *mut f32);
    fn TriggerAllDataReached() -> c_int;
    fn GetTriggerAllData(sel: c_int, channel: c_int, data: *mut f32);
    fn GetPlBrokenState() -> c_int;
    fn GetVcValue(channel: c_int) -> c_int;
    fn GetBPMPhaseValue(channel: c_int) -> f32;
    fn GetxyPosition(channel: c_int) -> c_int;
    fn GetVcSumValue(channel: c_int) -> c_int;
    fn GetxyProtect(channel: c_int) -> c_int;
    fn SetBPMk1(channel: c_int, value: f32);
    fn SetBPMk2(channel: c_int, value: f32);
    fn SetBPMk3(channel: c_int, value: f32);
    fn SetBPMPhaseOffset(channel: c_int, value: f32);
    fn SetBPMkxy(channel: c_int, value: c_int);
    fn SetBPMxyOffset(channel: c_int, value: c_int);
    fn SetBPMxyLimits(channel: c_int, value: c_int);
    fn SetReset(value: c_int);
    fn SetBPMSumLimits(channel: c_int, value: c_int);
    fn GetSumProtect(channel: c_int) -> c_int;
    fn SetBPMProtectFilterTime(value: f32);
    fn GetWRStatus(channel: c_int) -> c_int;
    fn SetWRCaputureDataTrigger();
    fn GetTimestampData(channel: c_int, tm_utc: *mut c_longlong, pps: *mut c_int);
    fn SetFreqControlWordtoDDS(value: c_int);
    fn SetSelectExternelTrigger(value: c_int);
}

/// White-Rabbit timestamp channel sampled by the capture marker
const TIMESTAMP_CHANNEL: c_int = 1;

/// Board backed by the vendor library.
///
/// The library keeps its own global state and is not reentrant for waveform
/// transfers, so calls are serialized through a mutex.
pub struct HardwareBoard {
    lock: std::sync::Mutex<()>,
}

impl HardwareBoard {
    pub fn new() -> Self {
        Self {
            lock: std::sync::Mutex::new(()),
        }
    }

    fn call<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }
}

impl Default for HardwareBoard {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY (all blocks below): the library takes plain integers and writes
// into caller-owned buffers sized for its largest transfer.
impl AcquisitionBoard for HardwareBoard {
    fn initialize(&self) {
        let status = self.call(|| unsafe { SystemInit() });
        if status < 0 {
            warn!("SystemInit returned {}", status);
        } else {
            info!("Board library initialized");
        }
    }

    fn rf_snapshot(&self, channel: usize) -> RfReading {
        let mut reading = RfReading::default();
        self.call(|| unsafe {
            GetRfInfo(channel as c_int, &mut reading.amplitude, &mut reading.phase)
        });
        reading
    }

    fn raw_waveform(&self, bank: TriggerBank, channel: usize) -> Vec<f32> {
        let mut data = vec![0.0f32; LIVE_CAPACITY];
        self.call(|| unsafe {
            GetTriggerAllData(bank.selector(), channel as c_int, data.as_mut_ptr())
        });
        data
    }

    fn history_waveform(&self, channel: usize) -> Vec<f32> {
        let mut data = vec![0.0f32; HISTORY_CAPACITY];
        self.call(|| unsafe { GetHistoryChannelData(channel as c_int, data.as_mut_ptr()) });
        data
    }

    fn raw_timestamp(&self) -> RawTimestamp {
        let mut seconds: c_longlong = 0;
        let mut ticks: c_int = 0;
        self.call(|| unsafe { GetTimestampData(TIMESTAMP_CHANNEL, &mut seconds, &mut ticks) });
        RawTimestamp {
            tai_seconds: seconds,
            tai_ticks: ticks.max(0) as u32,
        }
    }

    fn is_trigger_data_ready(&self) -> bool {
        // Blocks until the frame is complete, must not hold the call lock
        unsafe { TriggerAllDataReached() };
        true
    }

    fn is_history_data_ready(&self) -> bool {
        // The upload-reached call waits for the whole record, the storage
        // flag answers immediately
        self.call(|| unsafe { GetStorageDataReady() }) != 0
    }

    fn start_history_capture(&self) {
        self.call(|| unsafe { SetHistoryTrigger(1) });
    }

    fn latch_capture_marker(&self) {
        self.call(|| unsafe { SetWRCaputureDataTrigger() });
    }

    fn history_storage_ready(&self) -> i32 {
        self.call(|| unsafe { GetStorageDataReady() })
    }

    fn reset_history_storage(&self, value: i32) {
        self.call(|| unsafe { SetRsetDataStorage(value) });
    }

    fn digital_input(&self, channel: usize) -> i32 {
        let mut value: c_int = 0;
        self.call(|| unsafe { GetDI(channel as c_int, &mut value) });
        value
    }

    fn set_digital_output(&self, channel: usize, value: i32) {
        self.call(|| unsafe { SetDO(channel as c_int, value) });
    }

    fn fpga_led(&self, led: usize) -> i32 {
        self.call(|| unsafe {
            if led == 0 {
                GetFPGA_LED0()
            } else {
                GetFPGA_LED1()
            }
        })
    }

    fn set_system_led_enable(&self, value: i32) {
        self.call(|| unsafe { SetArmLedEnable(value) });
    }

    fn set_fan_led_state(&self, value: i32) {
        self.call(|| unsafe { SetFanLedStatus(value) });
    }

    fn set_pulse_output_enable(&self, value: u16) {
        self.call(|| unsafe { SetOutputPulseEnable(value as c_int) });
    }

    fn set_internal_trigger_enable(&self, value: i32) {
        self.call(|| unsafe { SetInnerTrigEn(value) });
    }

    fn select_trigger_source(&self, value: i32) {
        self.call(|| unsafe { SetSelectExternelTrigger(value) });
    }

    fn set_trigger_extract_ratio(&self, ratio: f32) {
        self.call(|| unsafe { SetTriggerExtractDataRatio(ratio) });
    }

    fn set_history_extract_ratio(&self, ratio: f32) {
        self.call(|| unsafe { SetHistoryExtractDataRatio(ratio) });
    }

    fn set_iq_start_sync(&self, value: i32) {
        self.call(|| unsafe { SetChangeStartIQSig(value) });
    }

    fn electrode_voltage(&self, channel: usize) -> i32 {
        self.call(|| unsafe { GetVcValue(channel as c_int) })
    }

    fn electrode_sum(&self, channel: usize) -> i32 {
        self.call(|| unsafe { GetVcSumValue(channel as c_int) })
    }

    fn bpm_phase(&self, channel: usize) -> f32 {
        self.call(|| unsafe { GetBPMPhaseValue(channel as c_int) })
    }

    fn xy_position(&self, channel: usize) -> i32 {
        self.call(|| unsafe { GetxyPosition(channel as c_int) })
    }

    fn xy_protect_status(&self, channel: usize) -> i32 {
        self.call(|| unsafe { GetxyProtect(channel as c_int) })
    }

    fn sum_protect_status(&self, channel: usize) -> i32 {
        self.call(|| unsafe { GetSumProtect(channel as c_int) })
    }

    fn adc_clock_state(&self) -> i32 {
        self.call(|| unsafe { GetPlBrokenState() })
    }

    fn white_rabbit_status(&self, channel: usize) -> i32 {
        self.call(|| unsafe { GetWRStatus(channel as c_int) })
    }

    fn set_bpm_k1(&self, channel: usize, value: f32) {
        self.call(|| unsafe { SetBPMk1(channel as c_int, value) });
    }

    fn set_bpm_k2(&self, channel: usize, value: f32) {
        self.call(|| unsafe { SetBPMk2(channel as c_int, value) });
    }

    fn set_bpm_k3(&self, channel: usize, value: f32) {
        self.call(|| unsafe { SetBPMk3(channel as c_int, value) });
    }

    fn set_bpm_phase_offset(&self, channel: usize, value: f32) {
        self.call(|| unsafe { SetBPMPhaseOffset(channel as c_int, value) });
    }

    fn set_bpm_kxy(&self, channel: usize, value: i32) {
        self.call(|| unsafe { SetBPMkxy(channel as c_int, value) });
    }

    fn set_bpm_xy_offset(&self, channel: usize, value: i32) {
        self.call(|| unsafe { SetBPMxyOffset(channel as c_int, value) });
    }

    fn set_bpm_xy_limit(&self, channel: usize, value: i32) {
        self.call(|| unsafe { SetBPMxyLimits(channel as c_int, value) });
    }

    fn set_bpm_sum_limit(&self, channel: usize, value: i32) {
        self.call(|| unsafe { SetBPMSumLimits(channel as c_int, value) });
    }

    fn set_protect_filter_time(&self, micros: f32) {
        self.call(|| unsafe { SetBPMProtectFilterTime(micros) });
    }

    fn set_dds_frequency_word(&self, value: i32) {
        self.call(|| unsafe { SetFreqControlWordtoDDS(value) });
    }

    fn reset_board(&self, value: i32) {
        self.call(|| unsafe { SetReset(value) });
    }
}
