pub mod context;

use std::time::Duration;

use log::{debug, trace, warn};

use crate::consts::{BROADCAST_UNIT_ID, MODBUS_GET_HOLDINGS};
use crate::frame::{self, FrameBuf, Request, Response};
use crate::transport::{SerialParams, Transport};
use crate::{calc_crc16, validate_unit_id, ErrorKind, UnitId, VectorTrait};
use context::RegisterStore;

#[cfg(feature = "with_serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
pub struct ResponderConfig {
    pub unit_id: UnitId,
    /// Line settings for the host's transport, e.g. `SerialTransport::open`
    #[cfg_attr(feature = "with_serde", serde(default))]
    pub serial: SerialParams,
}

impl ResponderConfig {
    pub fn new(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            serial: SerialParams::default(),
        }
    }

    pub fn serial(mut self, serial: SerialParams) -> Self {
        self.serial = serial;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponderState {
    #[default]
    Idle,
    FrameReceiving,
    FrameValidated,
    Dispatched,
}

/// Frame counters, never reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
pub struct ResponderStats {
    pub frames_received: u64,
    pub crc_errors: u64,
    pub broken_frames: u64,
    /// addressed to another unit, or broadcast reads
    pub ignored: u64,
    pub broadcasts: u64,
    pub exceptions: u64,
    pub responses: u64,
}

/// Modbus RTU responder ("slave")
///
/// ```no_run
/// use meter_rtu::{DenseStore, RegisterStore, Responder, ResponderConfig};
///
/// let mut store = DenseStore::new(0, 4).unwrap();
/// store.write_holdings(0, &[2200, 500, 1200, 1150]).unwrap();
/// let mut responder = Responder::new(&ResponderConfig::new(1)).unwrap();
/// let request = [0x01, 0x03, 0x00, 0x00, 0x00, 0x04, 0x44, 0x09];
/// if let Some(response) = responder.process_frame(&request, &mut store) {
///     // send the response
///     let _ = response.as_slice();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Responder {
    unit_id: UnitId,
    state: ResponderState,
    stats: ResponderStats,
}

impl Responder {
    pub fn new(config: &ResponderConfig) -> Result<Self, ErrorKind> {
        Ok(Self {
            unit_id: validate_unit_id(config.unit_id)?,
            state: ResponderState::Idle,
            stats: ResponderStats::default(),
        })
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    pub fn state(&self) -> ResponderState {
        self.state
    }

    pub fn stats(&self) -> &ResponderStats {
        &self.stats
    }

    fn set_state(&mut self, state: ResponderState) {
        trace!("responder {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Process one complete raw frame
    ///
    /// Returns the response to send, if any. Frames with a bad CRC, frames for other units and
    /// broadcast reads are dropped silently. Broadcast writes are applied without a response.
    pub fn process_frame<S: RegisterStore>(
        &mut self,
        raw: &[u8],
        store: &mut S,
    ) -> Option<FrameBuf> {
        self.set_state(ResponderState::FrameReceiving);
        self.stats.frames_received += 1;
        let response = self.handle(raw, store);
        self.set_state(ResponderState::Idle);
        if response.is_some() {
            self.stats.responses += 1;
        }
        response
    }

    fn handle<S: RegisterStore>(&mut self, raw: &[u8], store: &mut S) -> Option<FrameBuf> {
        let frame = match frame::decode(raw) {
            Ok(v) => v,
            Err(e) => {
                if matches!(e, ErrorKind::CrcMismatch { .. }) {
                    self.stats.crc_errors += 1;
                } else {
                    self.stats.broken_frames += 1;
                }
                debug!("frame dropped: {}", e);
                return None;
            }
        };
        self.set_state(ResponderState::FrameValidated);
        let broadcast = frame.unit_id == BROADCAST_UNIT_ID;
        if !broadcast && frame.unit_id != self.unit_id {
            self.stats.ignored += 1;
            debug!("frame for unit {} ignored", frame.unit_id);
            return None;
        }
        let request = match Request::parse(frame.func, &frame.payload) {
            Ok(v) => v,
            Err(e) => {
                if broadcast {
                    self.stats.ignored += 1;
                    return None;
                }
                return self.exception(frame.func, e);
            }
        };
        if broadcast {
            if !request.is_write() {
                self.stats.ignored += 1;
                debug!("broadcast read ignored");
                return None;
            }
            self.stats.broadcasts += 1;
        }
        self.set_state(ResponderState::Dispatched);
        let result = match request {
            Request::ReadHoldingRegisters { start, count } => self.read_response(start, count, store),
            Request::WriteSingleRegister { address, value } => store
                .set_holding(address, value)
                .and_then(|()| Response::WriteSingleRegister { address, value }.encode(self.unit_id)),
            Request::WriteMultipleRegisters { start, values } => {
                store.write_holdings(start, &values).and_then(|()| {
                    #[allow(clippy::cast_possible_truncation)]
                    let count = values.len() as u16;
                    Response::WriteMultipleRegisters { start, count }.encode(self.unit_id)
                })
            }
        };
        match result {
            Ok(_) if broadcast => None,
            Ok(response) => Some(response),
            Err(e) if broadcast => {
                debug!("broadcast write failed: {}", e);
                None
            }
            Err(e) => self.exception(frame.func, e),
        }
    }

    /// Read response assembled straight from the store
    fn read_response<S: RegisterStore>(
        &self,
        start: u16,
        count: u16,
        store: &S,
    ) -> Result<FrameBuf, ErrorKind> {
        let mut response = FrameBuf::new();
        VectorTrait::extend(&mut response, &[self.unit_id, MODBUS_GET_HOLDINGS])?;
        // 1b data len, validated by the store
        #[allow(clippy::cast_possible_truncation)]
        VectorTrait::push(&mut response, (count << 1) as u8)?;
        store.get_holdings_as_u8(start, count, &mut response)?;
        let crc = calc_crc16(&response, response.len());
        VectorTrait::extend(&mut response, &crc.to_le_bytes())?;
        Ok(response)
    }

    fn exception(&mut self, func: u8, e: ErrorKind) -> Option<FrameBuf> {
        let code = e.exception_code();
        warn!(
            "unit {} function 0x{:02X}: exception {} ({})",
            self.unit_id, func, code, e
        );
        self.stats.exceptions += 1;
        match frame::encode_exception(self.unit_id, func, code) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("unable to build exception frame: {}", e);
                None
            }
        }
    }

    /// Read one chunk from the transport, process it and write the response back
    ///
    /// Returns true if a response has been sent.
    pub fn serve_once<T: Transport, S: RegisterStore>(
        &mut self,
        transport: &mut T,
        store: &mut S,
        max_wait: Duration,
    ) -> Result<bool, ErrorKind> {
        let chunk = transport.read_bytes(max_wait)?;
        if chunk.is_empty() {
            return Ok(false);
        }
        trace!("responder got {:02x?}", chunk);
        if let Some(response) = self.process_frame(&chunk, store) {
            trace!("responder sends {:02x?}", response.as_slice());
            transport.write_bytes(&response)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Serve requests until the transport fails
    pub fn serve<T: Transport, S: RegisterStore>(
        &mut self,
        transport: &mut T,
        store: &mut S,
    ) -> Result<(), ErrorKind> {
        loop {
            self.serve_once(transport, store, Duration::from_secs(3600))?;
        }
    }
}
