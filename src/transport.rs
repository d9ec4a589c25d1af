//! Byte-stream transport used by the responder and requester engines
//!
//! The engines never touch a serial port directly. A [`Transport`] hands them silence-delimited
//! chunks of bytes and writes complete frames back. With the `serial` feature enabled,
//! [`SerialTransport`] implements it on top of the `serial` crate.
use std::time::Duration;

use crate::ErrorKind;

#[cfg(feature = "with_serde")]
use serde::{Deserialize, Serialize};

/// Byte-stream transport
pub trait Transport {
    /// Read one chunk of bytes, waiting up to `max_wait` for the first one
    ///
    /// Returns an empty vector if nothing arrived in time. Silence is never an error.
    fn read_bytes(&mut self, max_wait: Duration) -> Result<Vec<u8>, ErrorKind>;

    /// Write all bytes
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), ErrorKind>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_bytes(&mut self, max_wait: Duration) -> Result<Vec<u8>, ErrorKind> {
        (**self).read_bytes(max_wait)
    }
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), ErrorKind> {
        (**self).write_bytes(data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
pub enum Parity {
    None,
    Odd,
    #[default]
    Even,
}

/// Serial line parameters
///
/// Only the character time is derived from these, see [`crate::frame::RtuTiming`]. The default
/// is 9600 baud 8E1, as most energy meters ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
pub struct SerialParams {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::Even,
            stop_bits: 1,
        }
    }
}

impl SerialParams {
    pub fn new(baud_rate: u32, data_bits: u8, parity: Parity, stop_bits: u8) -> Self {
        Self {
            baud_rate,
            data_bits,
            parity,
            stop_bits,
        }
    }

    /// Bits on the wire per character: start + data + parity + stop
    pub fn bits_per_char(&self) -> u32 {
        let parity = u32::from(self.parity != Parity::None);
        1 + u32::from(self.data_bits) + parity + u32::from(self.stop_bits)
    }
}

#[cfg(feature = "serial")]
pub use self::serial_port::SerialTransport;

#[cfg(feature = "serial")]
mod serial_port {
    use std::io::{self, Read, Write};
    use std::time::{Duration, Instant};

    use log::{debug, trace};
    use serial::prelude::*;

    use super::{Parity, SerialParams, Transport};
    use crate::frame::{RtuFramer, RtuTiming};
    use crate::ErrorKind;

    impl From<serial::Error> for ErrorKind {
        fn from(e: serial::Error) -> Self {
            ErrorKind::Transport(io::Error::from(e).kind())
        }
    }

    /// RS-485 port opened through the `serial` crate
    ///
    /// Incoming bytes are timestamped and assembled into frames with [`RtuFramer`], so a chunk
    /// returned by [`Transport::read_bytes`] is exactly one silence-delimited frame. Frames
    /// poisoned by an inter-character gap are dropped here.
    pub struct SerialTransport {
        port: serial::SystemPort,
        timing: RtuTiming,
        framer: RtuFramer,
    }

    impl SerialTransport {
        pub fn open(path: &str, params: SerialParams) -> Result<Self, ErrorKind> {
            let mut port = serial::open(path)?;
            let baud_rate = serial::BaudRate::from_speed(params.baud_rate as usize);
            let char_size = match params.data_bits {
                5 => serial::Bits5,
                6 => serial::Bits6,
                7 => serial::Bits7,
                8 => serial::Bits8,
                _ => return Err(ErrorKind::Transport(io::ErrorKind::InvalidInput)),
            };
            let parity = match params.parity {
                Parity::None => serial::ParityNone,
                Parity::Odd => serial::ParityOdd,
                Parity::Even => serial::ParityEven,
            };
            let stop_bits = match params.stop_bits {
                1 => serial::Stop1,
                2 => serial::Stop2,
                _ => return Err(ErrorKind::Transport(io::ErrorKind::InvalidInput)),
            };
            port.reconfigure(&|settings| {
                settings.set_baud_rate(baud_rate)?;
                settings.set_char_size(char_size);
                settings.set_parity(parity);
                settings.set_stop_bits(stop_bits);
                settings.set_flow_control(serial::FlowNone);
                Ok(())
            })?;
            debug!("serial port {} opened, {:?}", path, params);
            let timing = RtuTiming::new(&params);
            Ok(Self {
                port,
                timing,
                framer: RtuFramer::new(timing),
            })
        }
    }

    impl Transport for SerialTransport {
        fn read_bytes(&mut self, max_wait: Duration) -> Result<Vec<u8>, ErrorKind> {
            let deadline = Instant::now() + max_wait;
            let mut byte = [0u8; 1];
            loop {
                let wait = if self.framer.is_idle() {
                    deadline.saturating_duration_since(Instant::now())
                } else {
                    self.timing.t3_5
                };
                if wait.is_zero() {
                    return Ok(Vec::new());
                }
                self.port.set_timeout(wait)?;
                match self.port.read(&mut byte) {
                    Ok(0) => {}
                    Ok(_) => match self.framer.push(byte[0], Instant::now()) {
                        Some(Ok(frame)) => return Ok(frame.to_vec()),
                        Some(Err(e)) => debug!("partial frame dropped: {}", e),
                        None => {}
                    },
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => match self.framer.finish() {
                        Some(Ok(frame)) => {
                            trace!("serial frame {:02x?}", frame.as_slice());
                            return Ok(frame.to_vec());
                        }
                        Some(Err(e)) => debug!("frame dropped: {}", e),
                        None => return Ok(Vec::new()),
                    },
                    Err(e) => return Err(e.into()),
                }
            }
        }

        fn write_bytes(&mut self, data: &[u8]) -> Result<(), ErrorKind> {
            trace!("serial write {:02x?}", data);
            self.port.write_all(data)?;
            self.port.flush()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_per_char() {
        assert_eq!(SerialParams::default().bits_per_char(), 11);
        assert_eq!(
            SerialParams::new(19200, 8, Parity::None, 1).bits_per_char(),
            10
        );
        assert_eq!(SerialParams::new(9600, 8, Parity::None, 2).bits_per_char(), 11);
        assert_eq!(SerialParams::new(9600, 7, Parity::Odd, 1).bits_per_char(), 10);
    }
}
