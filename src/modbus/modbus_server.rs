// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus gateway service
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the monitor, the client is
//! the diagnostic tool requesting values.
//!
//! Each scalar `(offset, channel)` occupies two consecutive registers at
//! `(offset · 16 + channel) · 2`, holding an IEEE-754 `f32` high word first.
//! A request spanning several values walks the channels, then the next
//! offset.

use std::collections::HashMap;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use log::{debug, error};
use tokio::task;
use tokio_modbus::prelude::*;

use crate::address::{Address, AddressKind};
use crate::engine::MonitorEngine;
use crate::error::MonitorError;

/// First input register of the power view
pub const POWER_REGISTER_BASE: u16 = 0x8000;

/// Channel slots reserved per offset
pub const CHANNELS_PER_OFFSET: u16 = 16;

/// Register address of a scalar
///
/// `None` when the channel does not fit its 16 slots or the address falls
/// past the scalar area (offsets from 1024 on).
///
/// # Examples
///
/// ```
/// use rust_bpm_monitor::modbus::register_address;
///
/// assert_eq!(register_address(34, 2), Some((34 * 16 + 2) * 2));
/// assert_eq!(register_address(2048, 0), None);
/// ```
pub fn register_address(offset: u16, channel: u16) -> Option<u16> {
    if channel >= CHANNELS_PER_OFFSET {
        return None;
    }
    let addr = (offset as u32 * CHANNELS_PER_OFFSET as u32 + channel as u32) * 2;
    if addr < POWER_REGISTER_BASE as u32 {
        u16::try_from(addr).ok()
    } else {
        None
    }
}

/// Split an `f32` into two registers, high word first
pub fn encode_f32(value: f32) -> [u16; 2] {
    let bits = value.to_bits();
    [(bits >> 16) as u16, bits as u16]
}

/// Rebuild an `f32` from two registers, high word first
pub fn decode_f32(high: u16, low: u16) -> f32 {
    f32::from_bits(((high as u32) << 16) | low as u32)
}

/// Scalar addresses covered by `cnt` registers starting at `addr`
fn scalar_span(addr: u16, cnt: u16, kind: AddressKind) -> Result<Vec<Address>, ExceptionCode> {
    if addr % 2 != 0 || cnt % 2 != 0 || cnt == 0 {
        error!("Exception::IllegalDataAddress - misaligned request {} (+{})", addr, cnt);
        return Err(ExceptionCode::IllegalDataAddress);
    }
    if addr as u32 + cnt as u32 > POWER_REGISTER_BASE as u32 {
        error!("Exception::IllegalDataAddress - request {} (+{}) out of range", addr, cnt);
        return Err(ExceptionCode::IllegalDataAddress);
    }

    let first = addr / 2;
    Ok((0..cnt / 2)
        .map(|i| {
            let slot = first + i;
            Address::new(kind, slot / CHANNELS_PER_OFFSET, slot % CHANNELS_PER_OFFSET)
        })
        .collect())
}

/// Input registers starting at `addr`, values read from `engine`
fn read_input(engine: &MonitorEngine, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
    let (kind, base) = if addr >= POWER_REGISTER_BASE {
        (AddressKind::Power, addr - POWER_REGISTER_BASE)
    } else {
        (AddressKind::Register, addr)
    };

    let mut words = Vec::with_capacity(cnt as usize);
    for address in scalar_span(base, cnt, kind)? {
        let value = match engine.try_read_scalar(&address) {
            Ok(value) => value,
            Err(MonitorError::InvalidAddress { .. }) => {
                error!("Exception::IllegalDataAddress - no register at {:?}", address);
                return Err(ExceptionCode::IllegalDataAddress);
            }
            Err(e) => {
                error!("Read of {:?} failed: {}", address, e);
                0.0
            }
        };
        words.extend(encode_f32(value));
    }
    Ok(words)
}

type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response, ExceptionCode>> + Send>>;

/// A Modbus TCP service exposing the register space of a [`MonitorEngine`].
///
/// # Register Map
///
/// ## Input Registers (Read-Only)
///
/// - `0x0000..0x8000`: scalar reads, kind `Register`
/// - `0x8000..`: the same layout with kind `Power` (calibrated kW)
///
/// ## Holding Registers (Read/Write)
///
/// - `0x0000..0x8000`: scalar writes; reading returns the last value written
///   through the gateway, 0 if none
pub struct MonitorModbusServer {
    engine: Arc<MonitorEngine>,
    holding_registers: Arc<Mutex<HashMap<Address, f32>>>,
}

impl tokio_modbus::server::Service for MonitorModbusServer {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = ServiceFuture;

    /// Process a Modbus request and provide a response
    ///
    /// This method handles different Modbus function codes:
    /// - 0x04: Read Input Registers
    /// - 0x03: Read Holding Registers
    /// - 0x10: Write Multiple Registers
    ///
    /// A single register cannot carry a value, 0x06 is answered with
    /// IllegalDataAddress. Any other function code will return an
    /// IllegalFunction exception.
    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);

        let res = match req {
            Request::ReadInputRegisters(addr, cnt) => {
                debug!(
                    "Reading {} input registers starting from address {}",
                    cnt, addr
                );
                // Scalar reads go through the board lock
                let engine = self.engine.clone();
                return Box::pin(async move {
                    let words = task::spawn_blocking(move || read_input(&engine, addr, cnt))
                        .await
                        .map_err(|e| {
                            error!("Blocking Modbus read failed: {}", e);
                            ExceptionCode::ServerDeviceFailure
                        })??;
                    Ok(Response::ReadInputRegisters(words))
                });
            }
            Request::ReadHoldingRegisters(addr, cnt) => {
                debug!(
                    "Reading {} holding registers starting from address {}",
                    cnt, addr
                );
                self.read_holding(addr, cnt)
                    .map(Response::ReadHoldingRegisters)
            }
            Request::WriteMultipleRegisters(addr, values) => {
                debug!(
                    "Writing {} values to holding registers starting from address {}",
                    values.len(),
                    addr
                );
                return self.write_holding(addr, &values);
            }
            Request::WriteSingleRegister(addr, value) => {
                error!(
                    "Exception::IllegalDataAddress - single register write {} at {}",
                    value, addr
                );
                Err(ExceptionCode::IllegalDataAddress)
            }
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        if let Err(e) = &res {
            error!("Modbus request error: {:?}", e);
        }

        Box::pin(future::ready(res))
    }
}

impl MonitorModbusServer {
    pub fn new(engine: Arc<MonitorEngine>) -> Self {
        Self {
            engine,
            holding_registers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Share the holding register shadow with another connection
    pub fn with_holding_registers(
        engine: Arc<MonitorEngine>,
        holding_registers: Arc<Mutex<HashMap<Address, f32>>>,
    ) -> Self {
        Self {
            engine,
            holding_registers,
        }
    }

    fn read_holding(&self, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
        let shadow = self
            .holding_registers
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let mut words = Vec::with_capacity(cnt as usize);
        for address in scalar_span(addr, cnt, AddressKind::Register)? {
            if !self.engine.is_writable(&address) {
                error!("Exception::IllegalDataAddress - no control at {:?}", address);
                return Err(ExceptionCode::IllegalDataAddress);
            }
            words.extend(encode_f32(shadow.get(&address).copied().unwrap_or(0.0)));
        }
        Ok(words)
    }

    fn write_holding(&self, addr: u16, values: &[u16]) -> ServiceFuture {
        let writes = match scalar_span(addr, values.len() as u16, AddressKind::Register) {
            Ok(addresses) => addresses
                .into_iter()
                .zip(values.chunks_exact(2))
                .map(|(address, pair)| (address, decode_f32(pair[0], pair[1])))
                .collect::<Vec<_>>(),
            Err(e) => return Box::pin(future::ready(Err(e))),
        };

        if let Some((address, _)) = writes
            .iter()
            .find(|(address, _)| !self.engine.is_writable(address))
        {
            error!("Exception::IllegalDataAddress - no control at {:?}", address);
            return Box::pin(future::ready(Err(ExceptionCode::IllegalDataAddress)));
        }

        {
            let mut shadow = self
                .holding_registers
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            shadow.extend(writes.iter().copied());
        }

        let quantity = values.len() as u16;
        let engine = self.engine.clone();

        if writes.iter().any(|(address, _)| engine.write_blocks(address)) {
            // History capture and calibration reload wait on the board or the
            // file system, keep them off the connection task
            return Box::pin(async move {
                task::spawn_blocking(move || {
                    for (address, value) in &writes {
                        engine.write_scalar(address, *value);
                    }
                })
                .await
                .map_err(|e| {
                    error!("Blocking Modbus write failed: {}", e);
                    ExceptionCode::ServerDeviceFailure
                })?;
                Ok(Response::WriteMultipleRegisters(addr, quantity))
            });
        }

        for (address, value) in &writes {
            engine.write_scalar(address, *value);
        }
        Box::pin(future::ready(Ok(Response::WriteMultipleRegisters(
            addr, quantity,
        ))))
    }
}
