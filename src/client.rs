use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::codec::Encoding;
use crate::consts::{BROADCAST_UNIT_ID, MAX_READ_COUNT, MAX_UNIT_ID, MODBUS_EXCEPTION_FLAG};
use crate::frame::{self, Request, Response, RtuTiming};
use crate::transport::{SerialParams, Transport};
use crate::{validate_unit_id, ErrorKind, UnitId};

#[cfg(feature = "with_serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
pub struct RequesterConfig {
    /// Measured from the moment the request has been written
    pub response_timeout: Duration,
    #[cfg_attr(feature = "with_serde", serde(default))]
    pub serial: SerialParams,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(1),
            serial: SerialParams::default(),
        }
    }
}

impl RequesterConfig {
    pub fn new(response_timeout: Duration, serial: SerialParams) -> Self {
        Self {
            response_timeout,
            serial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequesterState {
    #[default]
    Idle,
    AwaitingResponse,
}

/// Modbus RTU requester ("master")
///
/// One exchange at a time: every call writes a request and blocks until the matching response
/// arrives or the timeout expires. Frames that fail the CRC check, come from another unit or
/// answer another function are discarded and waiting continues until the same deadline.
///
/// ```no_run
/// # fn code<T: meter_rtu::Transport>(transport: T) -> Result<(), meter_rtu::ErrorKind> {
/// use meter_rtu::{Requester, RequesterConfig};
/// use std::time::Duration;
///
/// let mut requester = Requester::new(transport, RequesterConfig::default());
/// let words = requester.send_read(1, 0, 4, Duration::from_secs(1))?;
/// println!("voltage: {}", f64::from(words[0]) / 10.0);
/// # Ok(())
/// # }
/// ```
pub struct Requester<T: Transport> {
    transport: T,
    config: RequesterConfig,
    timing: RtuTiming,
    state: RequesterState,
    /// a late response may still be on the line
    drain_pending: bool,
}

impl<T: Transport> Requester<T> {
    pub fn new(transport: T, config: RequesterConfig) -> Self {
        Self {
            transport,
            timing: RtuTiming::new(&config.serial),
            config,
            state: RequesterState::Idle,
            drain_pending: false,
        }
    }

    pub fn state(&self) -> RequesterState {
        self.state
    }

    pub fn config(&self) -> &RequesterConfig {
        &self.config
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Give up on whatever the bus may still deliver
    ///
    /// Call after an exchange was cut short outside the requester (e.g. the transport was
    /// swapped or a caller timed out on its own). The next request drains the line until t3.5
    /// of silence first, so a late response is not taken for the answer to it. Timeouts do
    /// this automatically.
    pub fn abandon(&mut self) {
        self.drain_pending = true;
        self.set_state(RequesterState::Idle);
    }

    fn set_state(&mut self, state: RequesterState) {
        if self.state != state {
            trace!("requester {:?} -> {:?}", self.state, state);
        }
        self.state = state;
    }

    /// Read holding registers
    ///
    /// `count` must be in 1..=125, it is checked before anything is sent.
    pub fn send_read(
        &mut self,
        unit_id: UnitId,
        start: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, ErrorKind> {
        validate_unit_id(unit_id)?;
        if count == 0 || count > MAX_READ_COUNT {
            return Err(ErrorKind::IllegalDataValue);
        }
        let request = Request::ReadHoldingRegisters { start, count };
        match self.transact(unit_id, &request, timeout)? {
            Some(Response::ReadHoldingRegisters(words)) => Ok(words),
            _ => Err(ErrorKind::FrameBroken),
        }
    }

    /// Write a single holding register
    ///
    /// Unit 0 broadcasts the write, nothing is awaited then.
    pub fn send_write_single(
        &mut self,
        unit_id: UnitId,
        address: u16,
        value: u16,
        timeout: Duration,
    ) -> Result<(), ErrorKind> {
        let request = Request::WriteSingleRegister { address, value };
        self.transact_write(unit_id, &request, timeout)
    }

    /// Write consecutive holding registers (1..=123 values)
    ///
    /// Unit 0 broadcasts the write, nothing is awaited then.
    pub fn send_write_multiple(
        &mut self,
        unit_id: UnitId,
        start: u16,
        values: &[u16],
        timeout: Duration,
    ) -> Result<(), ErrorKind> {
        let request = Request::WriteMultipleRegisters {
            start,
            values: values.to_vec(),
        };
        self.transact_write(unit_id, &request, timeout)
    }

    /// Read and decode one measurement, using the configured timeout
    pub fn read_measurement(
        &mut self,
        unit_id: UnitId,
        address: u16,
        encoding: &Encoding,
    ) -> Result<f64, ErrorKind> {
        let words = self.send_read(
            unit_id,
            address,
            encoding.span(),
            self.config.response_timeout,
        )?;
        encoding.decode(&words)
    }

    /// Encode and write one measurement, using the configured timeout
    pub fn write_measurement(
        &mut self,
        unit_id: UnitId,
        address: u16,
        value: f64,
        encoding: &Encoding,
    ) -> Result<(), ErrorKind> {
        let words = encoding.encode(value)?;
        let timeout = self.config.response_timeout;
        if let [word] = words.as_slice() {
            self.send_write_single(unit_id, address, *word, timeout)
        } else {
            self.send_write_multiple(unit_id, address, &words, timeout)
        }
    }

    fn transact_write(
        &mut self,
        unit_id: UnitId,
        request: &Request,
        timeout: Duration,
    ) -> Result<(), ErrorKind> {
        if unit_id > MAX_UNIT_ID {
            return Err(ErrorKind::InvalidUnitId(unit_id));
        }
        self.transact(unit_id, request, timeout).map(|_| ())
    }

    /// Discard anything still on the line after an abandoned exchange
    fn drain(&mut self) -> Result<(), ErrorKind> {
        if !self.drain_pending {
            return Ok(());
        }
        self.drain_pending = false;
        let deadline = Instant::now() + self.config.response_timeout;
        loop {
            let chunk = self.transport.read_bytes(self.timing.t3_5)?;
            if chunk.is_empty() || Instant::now() >= deadline {
                return Ok(());
            }
            debug!("drained {} stale bytes", chunk.len());
        }
    }

    /// Send a request and wait for the matching response
    ///
    /// Returns None for broadcasts.
    fn transact(
        &mut self,
        unit_id: UnitId,
        request: &Request,
        timeout: Duration,
    ) -> Result<Option<Response>, ErrorKind> {
        let raw = request.encode(unit_id)?;
        self.drain()?;
        trace!("requester sends {:02x?}", raw.as_slice());
        self.transport.write_bytes(&raw)?;
        if unit_id == BROADCAST_UNIT_ID {
            return Ok(None);
        }
        self.set_state(RequesterState::AwaitingResponse);
        let result = self.await_response(unit_id, request, timeout);
        match result {
            Err(ErrorKind::ResponseTimeout) | Err(ErrorKind::Transport(_)) => {
                self.drain_pending = true;
            }
            _ => {}
        }
        self.set_state(RequesterState::Idle);
        match result? {
            Response::Exception { func, code } => {
                let e = ErrorKind::from_modbus_error(code);
                warn!(
                    "unit {} function 0x{:02X}: exception {} ({})",
                    unit_id, func, code, e
                );
                Err(e)
            }
            response => Ok(Some(response)),
        }
    }

    fn await_response(
        &mut self,
        unit_id: UnitId,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, ErrorKind> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                warn!("unit {}: no response within {:?}", unit_id, timeout);
                return Err(ErrorKind::ResponseTimeout);
            }
            let chunk = self.transport.read_bytes(deadline - now)?;
            if chunk.is_empty() {
                continue;
            }
            trace!("requester got {:02x?}", chunk);
            match accept_response(&chunk, unit_id, request) {
                Ok(response) => return Ok(response),
                Err(e) => debug!("response discarded: {}", e),
            }
        }
    }
}

/// Check a received frame against the outstanding request
fn accept_response(raw: &[u8], unit_id: UnitId, request: &Request) -> Result<Response, ErrorKind> {
    let frame = frame::decode(raw)?;
    if frame.unit_id != unit_id {
        return Err(ErrorKind::FrameBroken);
    }
    let func = request.function().value();
    if frame.func != func && frame.func != func | MODBUS_EXCEPTION_FLAG {
        return Err(ErrorKind::FrameBroken);
    }
    let response = Response::parse(frame.func, &frame.payload)?;
    let matches = match (request, &response) {
        (_, Response::Exception { .. }) => true,
        (Request::ReadHoldingRegisters { count, .. }, Response::ReadHoldingRegisters(words)) => {
            words.len() == usize::from(*count)
        }
        (
            Request::WriteSingleRegister { address, value },
            Response::WriteSingleRegister {
                address: echo_address,
                value: echo_value,
            },
        ) => address == echo_address && value == echo_value,
        (
            Request::WriteMultipleRegisters { start, values },
            Response::WriteMultipleRegisters {
                start: echo_start,
                count,
            },
        ) => start == echo_start && usize::from(*count) == values.len(),
        _ => false,
    };
    if matches {
        Ok(response)
    } else {
        Err(ErrorKind::FrameBroken)
    }
}
