//! RTU frame codec
//!
//! Wire layout: `[unit][func][payload 0..252][crc lo][crc hi]`. The CRC is CRC-16/MODBUS over
//! everything before it, sent low byte first.
use std::time::{Duration, Instant};

use log::trace;

use crate::consts::{
    MAX_FRAME_LEN, MAX_PAYLOAD_LEN, MAX_READ_COUNT, MAX_WRITE_COUNT, MIN_FRAME_LEN,
    MODBUS_EXCEPTION_FLAG, MODBUS_GET_HOLDINGS, MODBUS_SET_HOLDING, MODBUS_SET_HOLDINGS_BULK,
};
use crate::transport::SerialParams;
use crate::{calc_crc16, ErrorKind, VectorTrait};

/// Encoded RTU frame, never longer than 256 bytes
pub type FrameBuf = heapless::Vec<u8, MAX_FRAME_LEN>;

pub type Payload = heapless::Vec<u8, MAX_PAYLOAD_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    ReadHoldingRegisters,
    WriteSingleRegister,
    WriteMultipleRegisters,
    /// Anything else, including exception codes
    Custom(u8),
}

impl FunctionCode {
    pub fn new(value: u8) -> Self {
        match value {
            MODBUS_GET_HOLDINGS => FunctionCode::ReadHoldingRegisters,
            MODBUS_SET_HOLDING => FunctionCode::WriteSingleRegister,
            MODBUS_SET_HOLDINGS_BULK => FunctionCode::WriteMultipleRegisters,
            other => FunctionCode::Custom(other),
        }
    }

    pub fn value(self) -> u8 {
        match self {
            FunctionCode::ReadHoldingRegisters => MODBUS_GET_HOLDINGS,
            FunctionCode::WriteSingleRegister => MODBUS_SET_HOLDING,
            FunctionCode::WriteMultipleRegisters => MODBUS_SET_HOLDINGS_BULK,
            FunctionCode::Custom(value) => value,
        }
    }
}

/// Decoded, CRC-checked frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub unit_id: u8,
    pub func: u8,
    pub payload: Payload,
}

impl Frame {
    pub fn function(&self) -> FunctionCode {
        FunctionCode::new(self.func)
    }

    pub fn is_exception(&self) -> bool {
        self.func & MODBUS_EXCEPTION_FLAG != 0
    }

    /// The exception code, if this is a well-formed exception frame
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() && self.payload.len() == 1 {
            Some(self.payload[0])
        } else {
            None
        }
    }

    pub fn encode(&self) -> Result<FrameBuf, ErrorKind> {
        encode(self.unit_id, self.func, &self.payload)
    }
}

/// Build a frame and append its CRC
pub fn encode(unit_id: u8, func: u8, payload: &[u8]) -> Result<FrameBuf, ErrorKind> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ErrorKind::PayloadTooLarge(payload.len()));
    }
    let mut buf = FrameBuf::new();
    VectorTrait::extend(&mut buf, &[unit_id, func])?;
    VectorTrait::extend(&mut buf, payload)?;
    let crc = calc_crc16(&buf, buf.len());
    VectorTrait::extend(&mut buf, &crc.to_le_bytes())?;
    Ok(buf)
}

/// Build an exception frame, `func | 0x80` plus the exception code
pub fn encode_exception(unit_id: u8, func: u8, code: u8) -> Result<FrameBuf, ErrorKind> {
    encode(unit_id, func | MODBUS_EXCEPTION_FLAG, &[code])
}

/// Validate length and CRC of a raw frame
///
/// A frame with a bad CRC is never repaired.
pub fn decode(raw: &[u8]) -> Result<Frame, ErrorKind> {
    if raw.len() < MIN_FRAME_LEN || raw.len() > MAX_FRAME_LEN {
        return Err(ErrorKind::FrameBroken);
    }
    let data_len = raw.len() - 2;
    let expected = calc_crc16(raw, data_len);
    let actual = u16::from_le_bytes([raw[data_len], raw[data_len + 1]]);
    if expected != actual {
        return Err(ErrorKind::CrcMismatch { expected, actual });
    }
    let mut payload = Payload::new();
    VectorTrait::extend(&mut payload, &raw[2..data_len])?;
    Ok(Frame {
        unit_id: raw[0],
        func: raw[1],
        payload,
    })
}

fn words_be(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

fn push_words_be<V: VectorTrait<u8>>(buf: &mut V, words: &[u16]) -> Result<(), ErrorKind> {
    for word in words {
        buf.extend(&word.to_be_bytes())?;
    }
    Ok(())
}

/// Request PDU, as the responder dispatches it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadHoldingRegisters { start: u16, count: u16 },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleRegisters { start: u16, values: Vec<u16> },
}

impl Request {
    /// Parse a request payload
    ///
    /// Unsupported functions fail with [`ErrorKind::IllegalFunction`], bodies of the wrong length
    /// or with a byte count not matching the register count with [`ErrorKind::IllegalDataValue`].
    pub fn parse(func: u8, payload: &[u8]) -> Result<Self, ErrorKind> {
        match FunctionCode::new(func) {
            FunctionCode::ReadHoldingRegisters => {
                if payload.len() != 4 {
                    return Err(ErrorKind::IllegalDataValue);
                }
                Ok(Request::ReadHoldingRegisters {
                    start: u16::from_be_bytes([payload[0], payload[1]]),
                    count: u16::from_be_bytes([payload[2], payload[3]]),
                })
            }
            FunctionCode::WriteSingleRegister => {
                if payload.len() != 4 {
                    return Err(ErrorKind::IllegalDataValue);
                }
                Ok(Request::WriteSingleRegister {
                    address: u16::from_be_bytes([payload[0], payload[1]]),
                    value: u16::from_be_bytes([payload[2], payload[3]]),
                })
            }
            FunctionCode::WriteMultipleRegisters => {
                if payload.len() < 5 {
                    return Err(ErrorKind::IllegalDataValue);
                }
                let count = u16::from_be_bytes([payload[2], payload[3]]);
                let bytes = usize::from(payload[4]);
                if count == 0
                    || count > MAX_WRITE_COUNT
                    || bytes != usize::from(count) * 2
                    || payload.len() != 5 + bytes
                {
                    return Err(ErrorKind::IllegalDataValue);
                }
                Ok(Request::WriteMultipleRegisters {
                    start: u16::from_be_bytes([payload[0], payload[1]]),
                    values: words_be(&payload[5..]),
                })
            }
            FunctionCode::Custom(_) => Err(ErrorKind::IllegalFunction),
        }
    }

    pub fn function(&self) -> FunctionCode {
        match self {
            Request::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Request::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Request::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Request::ReadHoldingRegisters { .. })
    }

    /// Request payload, without unit, function and CRC
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_payload(&self) -> Result<Payload, ErrorKind> {
        let mut payload = Payload::new();
        match self {
            Request::ReadHoldingRegisters { start, count } => {
                VectorTrait::extend(&mut payload, &start.to_be_bytes())?;
                VectorTrait::extend(&mut payload, &count.to_be_bytes())?;
            }
            Request::WriteSingleRegister { address, value } => {
                VectorTrait::extend(&mut payload, &address.to_be_bytes())?;
                VectorTrait::extend(&mut payload, &value.to_be_bytes())?;
            }
            Request::WriteMultipleRegisters { start, values } => {
                if values.is_empty() || values.len() > usize::from(MAX_WRITE_COUNT) {
                    return Err(ErrorKind::IllegalDataValue);
                }
                VectorTrait::extend(&mut payload, &start.to_be_bytes())?;
                VectorTrait::extend(&mut payload, &(values.len() as u16).to_be_bytes())?;
                VectorTrait::push(&mut payload, (values.len() * 2) as u8)?;
                push_words_be(&mut payload, values)?;
            }
        }
        Ok(payload)
    }

    pub fn encode(&self, unit_id: u8) -> Result<FrameBuf, ErrorKind> {
        encode(unit_id, self.function().value(), &self.to_payload()?)
    }
}

/// Response PDU, as the requester interprets it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadHoldingRegisters(Vec<u16>),
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleRegisters { start: u16, count: u16 },
    Exception { func: u8, code: u8 },
}

impl Response {
    /// Parse a response payload for the given function code
    ///
    /// Fails with [`ErrorKind::FrameBroken`] on a malformed body.
    pub fn parse(func: u8, payload: &[u8]) -> Result<Self, ErrorKind> {
        if func & MODBUS_EXCEPTION_FLAG != 0 {
            if payload.len() != 1 {
                return Err(ErrorKind::FrameBroken);
            }
            return Ok(Response::Exception {
                func: func & !MODBUS_EXCEPTION_FLAG,
                code: payload[0],
            });
        }
        match FunctionCode::new(func) {
            FunctionCode::ReadHoldingRegisters => {
                let bytes = usize::from(*payload.first().ok_or(ErrorKind::FrameBroken)?);
                if bytes == 0 || bytes % 2 != 0 || payload.len() != bytes + 1 {
                    return Err(ErrorKind::FrameBroken);
                }
                Ok(Response::ReadHoldingRegisters(words_be(&payload[1..])))
            }
            FunctionCode::WriteSingleRegister => {
                if payload.len() != 4 {
                    return Err(ErrorKind::FrameBroken);
                }
                Ok(Response::WriteSingleRegister {
                    address: u16::from_be_bytes([payload[0], payload[1]]),
                    value: u16::from_be_bytes([payload[2], payload[3]]),
                })
            }
            FunctionCode::WriteMultipleRegisters => {
                if payload.len() != 4 {
                    return Err(ErrorKind::FrameBroken);
                }
                Ok(Response::WriteMultipleRegisters {
                    start: u16::from_be_bytes([payload[0], payload[1]]),
                    count: u16::from_be_bytes([payload[2], payload[3]]),
                })
            }
            FunctionCode::Custom(_) => Err(ErrorKind::FrameBroken),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self, unit_id: u8) -> Result<FrameBuf, ErrorKind> {
        let mut payload = Payload::new();
        let func = match self {
            Response::ReadHoldingRegisters(words) => {
                if words.is_empty() || words.len() > usize::from(MAX_READ_COUNT) {
                    return Err(ErrorKind::IllegalDataValue);
                }
                VectorTrait::push(&mut payload, (words.len() * 2) as u8)?;
                push_words_be(&mut payload, words)?;
                MODBUS_GET_HOLDINGS
            }
            Response::WriteSingleRegister { address, value } => {
                VectorTrait::extend(&mut payload, &address.to_be_bytes())?;
                VectorTrait::extend(&mut payload, &value.to_be_bytes())?;
                MODBUS_SET_HOLDING
            }
            Response::WriteMultipleRegisters { start, count } => {
                VectorTrait::extend(&mut payload, &start.to_be_bytes())?;
                VectorTrait::extend(&mut payload, &count.to_be_bytes())?;
                MODBUS_SET_HOLDINGS_BULK
            }
            Response::Exception { func, code } => {
                return encode_exception(unit_id, *func, *code);
            }
        };
        encode(unit_id, func, &payload)
    }
}

/// RTU inter-character (t1.5) and inter-frame (t3.5) silence intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtuTiming {
    pub char_time: Duration,
    pub t1_5: Duration,
    pub t3_5: Duration,
}

impl RtuTiming {
    /// Above this rate the intervals are fixed at 750 us and 1750 us
    pub const FIXED_TIMING_ABOVE_BAUD: u32 = 19200;

    pub fn new(params: &SerialParams) -> Self {
        let baud = u64::from(params.baud_rate.max(1));
        let char_time =
            Duration::from_nanos(u64::from(params.bits_per_char()) * 1_000_000_000 / baud);
        if params.baud_rate > Self::FIXED_TIMING_ABOVE_BAUD {
            Self {
                char_time,
                t1_5: Duration::from_micros(750),
                t3_5: Duration::from_micros(1750),
            }
        } else {
            Self {
                char_time,
                t1_5: char_time * 3 / 2,
                t3_5: char_time * 7 / 2,
            }
        }
    }
}

impl Default for RtuTiming {
    fn default() -> Self {
        Self::new(&SerialParams::default())
    }
}

/// Assembles timestamped bytes into silence-delimited frames
///
/// A gap of at least t3.5 closes the current frame. A gap longer than t1.5 but shorter than t3.5
/// inside a frame poisons it: the frame is still collected until the next t3.5 silence, then
/// dropped as [`ErrorKind::FrameTimeout`]. Frames are not CRC-checked here.
#[derive(Debug, Clone)]
pub struct RtuFramer {
    timing: RtuTiming,
    buf: FrameBuf,
    last: Option<Instant>,
    poisoned: bool,
    overflow: bool,
}

impl RtuFramer {
    pub fn new(timing: RtuTiming) -> Self {
        Self {
            timing,
            buf: FrameBuf::new(),
            last: None,
            poisoned: false,
            overflow: false,
        }
    }

    /// True if no frame is being collected
    pub fn is_idle(&self) -> bool {
        self.last.is_none()
    }

    /// Feed one byte received at `at`
    ///
    /// Returns the previous frame if the silence before this byte closed it.
    pub fn push(&mut self, byte: u8, at: Instant) -> Option<Result<FrameBuf, ErrorKind>> {
        let mut closed = None;
        if let Some(last) = self.last {
            let gap = at.saturating_duration_since(last);
            if gap >= self.timing.t3_5 {
                closed = self.finish();
            } else if gap > self.timing.t1_5 && !self.poisoned {
                trace!("inter-character gap {:?} exceeds t1.5", gap);
                self.poisoned = true;
            }
        }
        if self.buf.push(byte).is_err() {
            self.overflow = true;
        }
        self.last = Some(at);
        closed
    }

    /// Close the current frame if the line has been silent for t3.5 by `now`
    pub fn poll(&mut self, now: Instant) -> Option<Result<FrameBuf, ErrorKind>> {
        match self.last {
            Some(last) if now.saturating_duration_since(last) >= self.timing.t3_5 => self.finish(),
            _ => None,
        }
    }

    /// Close the current frame unconditionally
    pub fn finish(&mut self) -> Option<Result<FrameBuf, ErrorKind>> {
        self.last?;
        let result = if self.overflow {
            Err(ErrorKind::FrameBroken)
        } else if self.poisoned {
            Err(ErrorKind::FrameTimeout)
        } else {
            Ok(self.buf.clone())
        };
        self.reset();
        Some(result)
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.last = None;
        self.poisoned = false;
        self.overflow = false;
    }
}
