//! MODBUS RTU Constants

// MODBUS Functions
pub const MODBUS_GET_HOLDINGS: u8 = 3;
pub const MODBUS_SET_HOLDING: u8 = 6;
pub const MODBUS_SET_HOLDINGS_BULK: u8 = 16;

/// Set on the function code of an exception response
pub const MODBUS_EXCEPTION_FLAG: u8 = 0x80;

// MODBUS Errors
pub const MODBUS_ERROR_ILLEGAL_FUNCTION: u8 = 1;
pub const MODBUS_ERROR_ILLEGAL_DATA_ADDRESS: u8 = 2;
pub const MODBUS_ERROR_ILLEGAL_DATA_VALUE: u8 = 3;
pub const MODBUS_ERROR_SLAVE_DEVICE_FAILURE: u8 = 4;
pub const MODBUS_ERROR_ACKNOWLEDGE: u8 = 5;
pub const MODBUS_ERROR_SLAVE_BUSY: u8 = 6;
pub const MODBUS_ERROR_NEGATIVE_ACKNOWLEDGE: u8 = 7;
pub const MODBUS_ERROR_MEMORY_PARITY: u8 = 8;
pub const MODBUS_ERROR_GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;
pub const MODBUS_ERROR_GATEWAY_TARGET_FAILED: u8 = 0x0B;

// Unit addresses
pub const BROADCAST_UNIT_ID: u8 = 0;
pub const MAX_UNIT_ID: u8 = 247;

// Frame limits
pub const MAX_FRAME_LEN: usize = 256;
pub const MAX_PAYLOAD_LEN: usize = 252;
/// unit + function + CRC16
pub const MIN_FRAME_LEN: usize = 4;

/// (252 - 1 byte count) / 2
pub const MAX_READ_COUNT: u16 = 125;
/// (252 - 5 header bytes) / 2
pub const MAX_WRITE_COUNT: u16 = 123;
