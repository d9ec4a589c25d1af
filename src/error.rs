use thiserror::Error;

use crate::consts::{
    MODBUS_ERROR_ACKNOWLEDGE, MODBUS_ERROR_GATEWAY_PATH_UNAVAILABLE,
    MODBUS_ERROR_GATEWAY_TARGET_FAILED, MODBUS_ERROR_ILLEGAL_DATA_ADDRESS,
    MODBUS_ERROR_ILLEGAL_DATA_VALUE, MODBUS_ERROR_ILLEGAL_FUNCTION,
    MODBUS_ERROR_MEMORY_PARITY, MODBUS_ERROR_NEGATIVE_ACKNOWLEDGE, MODBUS_ERROR_SLAVE_BUSY,
    MODBUS_ERROR_SLAVE_DEVICE_FAILURE,
};

#[allow(clippy::module_name_repetitions)]
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    #[error("FRAME CRC ERROR (expected 0x{expected:04X}, got 0x{actual:04X})")]
    CrcMismatch { expected: u16, actual: u16 },
    #[error("FRAME TIMEOUT - INTER-CHARACTER GAP EXCEEDED")]
    FrameTimeout,
    #[error("FRAME BROKEN")]
    FrameBroken,
    #[error("PAYLOAD TOO LARGE ({0} bytes)")]
    PayloadTooLarge(usize),
    #[error("MODBUS ERROR CODE 01 - ILLEGAL FUNCTION")]
    IllegalFunction,
    #[error("MODBUS ERROR CODE 02 - ILLEGAL DATA ADDRESS")]
    IllegalDataAddress,
    #[error("MODBUS ERROR CODE 03 - ILLEGAL DATA VALUE")]
    IllegalDataValue,
    #[error("MODBUS ERROR CODE 04 - SLAVE DEVICE FAILURE")]
    SlaveDeviceFailure,
    #[error("MODBUS ERROR CODE 05 - ACKNOWLEDGE")]
    Acknowledge,
    #[error("MODBUS ERROR CODE 06 - SLAVE DEVICE BUSY")]
    SlaveDeviceBusy,
    #[error("MODBUS ERROR CODE 07 - NEGATIVE ACKNOWLEDGE")]
    NegativeAcknowledge,
    #[error("MODBUS ERROR CODE 08 - MEMORY PARITY ERROR")]
    MemoryParityError,
    #[error("MODBUS ERROR CODE 10 - GATEWAY PATH UNAVAILABLE")]
    GatewayPathUnavailable,
    #[error("MODBUS ERROR CODE 11 - GATEWAY TARGET DEVICE FAILED TO RESPOND")]
    GatewayTargetFailed,
    #[error("UNKNOWN MODBUS ERROR CODE 0x{0:02X}")]
    UnknownException(u8),
    #[error("VALUE OUT OF RANGE")]
    ValueOutOfRange,
    #[error("MALFORMED FLOAT (NaN or infinity)")]
    MalformedFloat,
    #[error("NO RESPONSE WITHIN TIMEOUT")]
    ResponseTimeout,
    #[error("INVALID UNIT ID {0}")]
    InvalidUnitId(u8),
    #[error("TRANSPORT ERROR: {0}")]
    Transport(std::io::ErrorKind),
}

impl ErrorKind {
    /// Maps a Modbus exception code received on the wire
    pub fn from_modbus_error(code: u8) -> Self {
        match code {
            MODBUS_ERROR_ILLEGAL_FUNCTION => ErrorKind::IllegalFunction,
            MODBUS_ERROR_ILLEGAL_DATA_ADDRESS => ErrorKind::IllegalDataAddress,
            MODBUS_ERROR_ILLEGAL_DATA_VALUE => ErrorKind::IllegalDataValue,
            MODBUS_ERROR_SLAVE_DEVICE_FAILURE => ErrorKind::SlaveDeviceFailure,
            MODBUS_ERROR_ACKNOWLEDGE => ErrorKind::Acknowledge,
            MODBUS_ERROR_SLAVE_BUSY => ErrorKind::SlaveDeviceBusy,
            MODBUS_ERROR_NEGATIVE_ACKNOWLEDGE => ErrorKind::NegativeAcknowledge,
            MODBUS_ERROR_MEMORY_PARITY => ErrorKind::MemoryParityError,
            MODBUS_ERROR_GATEWAY_PATH_UNAVAILABLE => ErrorKind::GatewayPathUnavailable,
            MODBUS_ERROR_GATEWAY_TARGET_FAILED => ErrorKind::GatewayTargetFailed,
            other => ErrorKind::UnknownException(other),
        }
    }

    /// Exception code to put on the wire when a request fails with this error
    ///
    /// Errors that have no Modbus counterpart map to SLAVE DEVICE FAILURE.
    pub fn exception_code(self) -> u8 {
        match self {
            ErrorKind::IllegalFunction => MODBUS_ERROR_ILLEGAL_FUNCTION,
            ErrorKind::IllegalDataAddress => MODBUS_ERROR_ILLEGAL_DATA_ADDRESS,
            ErrorKind::IllegalDataValue => MODBUS_ERROR_ILLEGAL_DATA_VALUE,
            ErrorKind::Acknowledge => MODBUS_ERROR_ACKNOWLEDGE,
            ErrorKind::SlaveDeviceBusy => MODBUS_ERROR_SLAVE_BUSY,
            ErrorKind::NegativeAcknowledge => MODBUS_ERROR_NEGATIVE_ACKNOWLEDGE,
            ErrorKind::MemoryParityError => MODBUS_ERROR_MEMORY_PARITY,
            ErrorKind::GatewayPathUnavailable => MODBUS_ERROR_GATEWAY_PATH_UNAVAILABLE,
            ErrorKind::GatewayTargetFailed => MODBUS_ERROR_GATEWAY_TARGET_FAILED,
            ErrorKind::UnknownException(code) => code,
            _ => MODBUS_ERROR_SLAVE_DEVICE_FAILURE,
        }
    }

    /// Line noise: the frame is dropped and never reported to the peer
    pub fn is_framing(self) -> bool {
        matches!(
            self,
            ErrorKind::CrcMismatch { .. } | ErrorKind::FrameTimeout | ErrorKind::FrameBroken
        )
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(e: std::io::Error) -> Self {
        ErrorKind::Transport(e.kind())
    }
}
