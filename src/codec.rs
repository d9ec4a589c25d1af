//! Conversions between physical values and holding-register words
//!
//! A measurement occupies either one register (a scaled integer, `round(value * scale)`) or two
//! registers (an IEEE 754 single precision float). Two independent orderings apply:
//!
//! * [`ByteOrder`] governs the two bytes inside every 16-bit register
//! * [`WordOrder`] governs which of the two registers (the one at the lower address or the one
//!   at the higher address) carries the most significant half of a 32-bit value
//!
//! All functions are pure.
use crate::ErrorKind;
use ieee754::Ieee754;

#[cfg(feature = "with_bincode")]
use bincode::{Decode, Encode};
#[cfg(feature = "with_serde")]
use serde::{Deserialize, Serialize};

/// Byte layout within one 16-bit register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "with_bincode", derive(Decode, Encode))]
pub enum ByteOrder {
    /// Most significant byte first (Modbus native)
    #[default]
    Big,
    Little,
}

/// Register layout of a two-register value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "with_bincode", derive(Decode, Encode))]
pub enum WordOrder {
    /// Most significant half at the lower address
    #[default]
    Big,
    /// Least significant half at the lower address ("word swapped")
    Little,
}

/// What to do with NaN and infinity bit patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
pub enum FloatPolicy {
    #[default]
    RejectNonFinite,
    AcceptNonFinite,
}

#[inline]
fn apply_byte_order(word: u16, byte_order: ByteOrder) -> u16 {
    match byte_order {
        ByteOrder::Big => word,
        ByteOrder::Little => word.swap_bytes(),
    }
}

fn check_scale(scale: u32) -> Result<f64, ErrorKind> {
    if scale == 0 {
        return Err(ErrorKind::ValueOutOfRange);
    }
    Ok(f64::from(scale))
}

/// Encode a value as an unsigned scaled integer: `round(value * scale)`
///
/// Rounds half away from zero. Fails with [`ErrorKind::ValueOutOfRange`] if the result does not
/// fit 0..=65535, the value is not finite or the scale is zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn encode_scaled(value: f64, scale: u32) -> Result<u16, ErrorKind> {
    let scaled = (value * check_scale(scale)?).round();
    if !scaled.is_finite() || scaled < 0.0 || scaled > f64::from(u16::MAX) {
        return Err(ErrorKind::ValueOutOfRange);
    }
    Ok(scaled as u16)
}

/// Encode a value as a signed (two's complement) scaled integer
///
/// Same as [`encode_scaled`], the accepted range is -32768..=32767.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_scaled_signed(value: f64, scale: u32) -> Result<u16, ErrorKind> {
    let scaled = (value * check_scale(scale)?).round();
    if !scaled.is_finite() || scaled < f64::from(i16::MIN) || scaled > f64::from(i16::MAX) {
        return Err(ErrorKind::ValueOutOfRange);
    }
    Ok(u16::from_be_bytes((scaled as i16).to_be_bytes()))
}

/// `word / scale`
pub fn decode_scaled(word: u16, scale: u32) -> Result<f64, ErrorKind> {
    Ok(f64::from(word) / check_scale(scale)?)
}

/// `word / scale`, the word interpreted as i16
pub fn decode_scaled_signed(word: u16, scale: u32) -> Result<f64, ErrorKind> {
    Ok(f64::from(i16::from_be_bytes(word.to_be_bytes())) / check_scale(scale)?)
}

/// Split a u32 into two registers
pub fn u32_to_registers(value: u32, byte_order: ByteOrder, word_order: WordOrder) -> [u16; 2] {
    #[allow(clippy::cast_possible_truncation)]
    let (high, low) = (
        apply_byte_order((value >> 16) as u16, byte_order),
        apply_byte_order(value as u16, byte_order),
    );
    match word_order {
        WordOrder::Big => [high, low],
        WordOrder::Little => [low, high],
    }
}

/// Join two registers (in address order) into a u32
pub fn registers_to_u32(regs: [u16; 2], byte_order: ByteOrder, word_order: WordOrder) -> u32 {
    let (high, low) = match word_order {
        WordOrder::Big => (regs[0], regs[1]),
        WordOrder::Little => (regs[1], regs[0]),
    };
    (u32::from(apply_byte_order(high, byte_order)) << 16)
        | u32::from(apply_byte_order(low, byte_order))
}

/// Encode a value as an IEEE 754 single precision float spread over two registers
///
/// Returns the registers in address order. The value is rounded to the nearest f32. Finite values
/// beyond the f32 range fail with [`ErrorKind::ValueOutOfRange`], NaN and infinity fail with
/// [`ErrorKind::MalformedFloat`] unless the policy accepts them.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_f32(
    value: f64,
    byte_order: ByteOrder,
    word_order: WordOrder,
    policy: FloatPolicy,
) -> Result<[u16; 2], ErrorKind> {
    if !value.is_finite() && policy == FloatPolicy::RejectNonFinite {
        return Err(ErrorKind::MalformedFloat);
    }
    let single = value as f32;
    if value.is_finite() && !single.is_finite() {
        return Err(ErrorKind::ValueOutOfRange);
    }
    Ok(u32_to_registers(single.bits(), byte_order, word_order))
}

/// Decode two registers (in address order) holding an IEEE 754 single precision float
pub fn decode_f32(
    regs: [u16; 2],
    byte_order: ByteOrder,
    word_order: WordOrder,
    policy: FloatPolicy,
) -> Result<f64, ErrorKind> {
    let single: f32 = Ieee754::from_bits(registers_to_u32(regs, byte_order, word_order));
    if !single.is_finite() && policy == FloatPolicy::RejectNonFinite {
        return Err(ErrorKind::MalformedFloat);
    }
    Ok(f64::from(single))
}

/// Registers produced by [`Encoding::encode`], one or two words in address order
pub type EncodedWords = heapless::Vec<u16, 2>;

/// How a measurement is laid out in holding registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "with_bincode", derive(Decode, Encode))]
pub enum Encoding {
    /// One register, `round(value * scale)`
    Scaled {
        scale: u32,
        signed: bool,
        byte_order: ByteOrder,
    },
    /// Two registers, IEEE 754 single precision
    Float32 {
        byte_order: ByteOrder,
        word_order: WordOrder,
    },
}

impl Encoding {
    /// Unsigned, big-endian scaled integer
    pub fn scaled(scale: u32) -> Self {
        Encoding::Scaled {
            scale,
            signed: false,
            byte_order: ByteOrder::Big,
        }
    }

    pub fn scaled_signed(scale: u32) -> Self {
        Encoding::Scaled {
            scale,
            signed: true,
            byte_order: ByteOrder::Big,
        }
    }

    pub fn float32(byte_order: ByteOrder, word_order: WordOrder) -> Self {
        Encoding::Float32 {
            byte_order,
            word_order,
        }
    }

    /// Number of registers occupied
    pub fn span(&self) -> u16 {
        match self {
            Encoding::Scaled { .. } => 1,
            Encoding::Float32 { .. } => 2,
        }
    }

    pub fn encode(&self, value: f64) -> Result<EncodedWords, ErrorKind> {
        let mut words = EncodedWords::new();
        match *self {
            Encoding::Scaled {
                scale,
                signed,
                byte_order,
            } => {
                let word = if signed {
                    encode_scaled_signed(value, scale)?
                } else {
                    encode_scaled(value, scale)?
                };
                words
                    .push(apply_byte_order(word, byte_order))
                    .map_err(|_| ErrorKind::PayloadTooLarge(2))?;
            }
            Encoding::Float32 {
                byte_order,
                word_order,
            } => {
                let regs = encode_f32(value, byte_order, word_order, FloatPolicy::default())?;
                words
                    .extend_from_slice(&regs)
                    .map_err(|_| ErrorKind::PayloadTooLarge(2))?;
            }
        }
        Ok(words)
    }

    /// Decode registers in address order, `regs` must hold exactly [`Encoding::span`] words
    pub fn decode(&self, regs: &[u16]) -> Result<f64, ErrorKind> {
        if regs.len() != usize::from(self.span()) {
            return Err(ErrorKind::IllegalDataValue);
        }
        match *self {
            Encoding::Scaled {
                scale,
                signed,
                byte_order,
            } => {
                let word = apply_byte_order(regs[0], byte_order);
                if signed {
                    decode_scaled_signed(word, scale)
                } else {
                    decode_scaled(word, scale)
                }
            }
            Encoding::Float32 {
                byte_order,
                word_order,
            } => decode_f32(
                [regs[0], regs[1]],
                byte_order,
                word_order,
                FloatPolicy::default(),
            ),
        }
    }
}
