#![ doc = include_str!( concat!( env!( "CARGO_MANIFEST_DIR" ), "/", "README.md" ) ) ]

pub mod client;
pub mod codec;
pub mod consts;
pub mod frame;
pub mod meter;
pub mod server;
pub mod transport;

mod vector;
pub use vector::VectorTrait;

mod error;
pub use error::ErrorKind;

pub use client::{Requester, RequesterConfig, RequesterState};
pub use codec::{ByteOrder, Encoding, FloatPolicy, WordOrder};
pub use frame::{Frame, FrameBuf, FunctionCode};
pub use meter::{MeasurementPoint, MeterMap};
pub use server::context::{DenseStore, HoldingStore, RegisterStore, SparseStore, StoreLayout};
pub use server::{Responder, ResponderConfig, ResponderState};
pub use transport::{Parity, SerialParams, Transport};

use consts::{BROADCAST_UNIT_ID, MAX_UNIT_ID, MODBUS_SET_HOLDINGS_BULK};

#[cfg(test)]
mod tests;

/// Modbus unit (slave) address: 1..=247, 0 is broadcast
pub type UnitId = u8;

/// Check the address a responder answers to
///
/// Broadcast (0) and the reserved range 248..=255 are rejected.
pub fn validate_unit_id(unit_id: UnitId) -> Result<UnitId, ErrorKind> {
    if unit_id == BROADCAST_UNIT_ID || unit_id > MAX_UNIT_ID {
        Err(ErrorKind::InvalidUnitId(unit_id))
    } else {
        Ok(unit_id)
    }
}

/// CRC-16/MODBUS of the first `data_length` bytes
pub fn calc_crc16(frame: &[u8], data_length: usize) -> u16 {
    let mut crc: u16 = 0xffff;
    for i in frame.iter().take(data_length) {
        crc ^= u16::from(*i);
        for _ in (0..8).rev() {
            if (crc & 0x0001) == 0 {
                crc >>= 1;
            } else {
                crc >>= 1;
                crc ^= 0xA001;
            }
        }
    }
    crc
}

/// Guess response frame length
///
/// Frames are often read byte-by-byte. Having the first 3 bytes read, the function returns the
/// total RTU frame length, CRC included. The remaining amount of bytes to read is the result
/// minus the bytes already read.
///
/// * the function may return wrong result for broken frames
///
/// * the function returns ErrorKind::FrameBroken if the buffer is shorter than 3 bytes or the
///   function code is not supported
pub fn guess_response_frame_len(buf: &[u8]) -> Result<usize, ErrorKind> {
    if buf.len() < 3 {
        return Err(ErrorKind::FrameBroken);
    }
    let func = buf[1];
    let len = if func < 0x80 {
        match func {
            3 => usize::from(buf[2]) + 5,
            6 | 16 => 8,
            _ => {
                return Err(ErrorKind::FrameBroken);
            }
        }
    } else {
        5
    };
    Ok(len)
}

/// Guess request frame length
///
/// Having the first 7 bytes read (8 is also fine, as that's the minimal correct request length),
/// the function returns the total RTU frame length, CRC included.
///
/// * the function may return wrong result for broken frames
///
/// * the function returns ErrorKind::FrameBroken if the buffer is too short to tell
pub fn guess_request_frame_len(frame: &[u8]) -> Result<usize, ErrorKind> {
    if frame.len() < 2 {
        return Err(ErrorKind::FrameBroken);
    }
    match frame[1] {
        MODBUS_SET_HOLDINGS_BULK => frame
            .get(6)
            .map(|bytes| usize::from(*bytes) + 9)
            .ok_or(ErrorKind::FrameBroken),
        _ => Ok(8),
    }
}
