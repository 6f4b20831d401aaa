//! Byte-frame encoding and response decoding
//!
//! Everything here is pure: frames are built on the stack per call and
//! decoding never touches the bus. Multi-byte values always travel high
//! byte first.

use std::fmt;
use std::ops::Deref;

/// Longest frame any driver sends: command byte plus a 32-bit payload
pub const MAX_FRAME_LEN: usize = 5;

/// Bytes for one bus write
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl Frame {
    pub const fn new() -> Self {
        Self {
            bytes: [0; MAX_FRAME_LEN],
            len: 0,
        }
    }

    /// Build a frame from at most [`MAX_FRAME_LEN`] bytes; extra bytes are dropped
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut frame = Self::new();
        for &byte in bytes.iter().take(MAX_FRAME_LEN) {
            frame.push(byte);
        }
        frame
    }

    fn push(&mut self, byte: u8) {
        if self.len < MAX_FRAME_LEN {
            self.bytes[self.len] = byte;
            self.len += 1;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:02X?})", self.as_bytes())
    }
}

/// Device-specific rule for turning a command and a value into a frame
pub trait CommandPacking {
    fn pack(&self, command: u8, value: u32) -> Frame;
}

/// `[register, value_high, ..., value_low]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFirst {
    /// Payload width in bytes
    pub width: usize,
}

impl CommandPacking for RegisterFirst {
    fn pack(&self, command: u8, value: u32) -> Frame {
        encode_write(command, value, self.width)
    }
}

/// Command shifted left with the value's top bits folded into the low bits
///
/// Produces `[(command << shift) | ((value >> 8) & high_mask), value & 0xFF]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftedCommand {
    pub shift: u32,
    /// Number of value bits above the low byte carried in the command byte
    pub high_bits: u32,
}

impl CommandPacking for ShiftedCommand {
    fn pack(&self, command: u8, value: u32) -> Frame {
        let high_mask = 1u32.checked_shl(self.high_bits).map_or(u32::MAX, |bit| bit - 1);
        let head = u32::from(command).checked_shl(self.shift).unwrap_or(0) | ((value >> 8) & high_mask);
        Frame::from_slice(&[head as u8, (value & 0xFF) as u8])
    }
}

/// Encode a register write with a `width`-byte payload, high byte first
///
/// Widths above 4 are clamped to 4.
pub fn encode_write(register: u8, value: u32, width: usize) -> Frame {
    let width = width.min(MAX_FRAME_LEN - 1);
    let mut frame = Frame::new();
    frame.push(register);
    for index in (0..width).rev() {
        frame.push((value >> (8 * index)) as u8);
    }
    frame
}

/// How to interpret response bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decode {
    /// Reinterpret the (masked) value as signed 16-bit two's complement
    pub signed: bool,
    /// Applied to the assembled value before sign handling
    pub mask: Option<u32>,
}

impl Decode {
    pub const UNSIGNED: Decode = Decode {
        signed: false,
        mask: None,
    };

    pub const SIGNED_16: Decode = Decode {
        signed: true,
        mask: None,
    };

    pub const fn masked(mask: u32) -> Decode {
        Decode {
            signed: false,
            mask: Some(mask),
        }
    }
}

/// Assemble up to four bytes, first byte most significant
pub fn decode_be(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .fold(0u32, |acc, &byte| (acc << 8) | u32::from(byte))
}

/// Assemble, mask and optionally sign-correct a response
pub fn decode_response(bytes: &[u8], decode: Decode) -> i64 {
    let mut raw = decode_be(bytes);
    if let Some(mask) = decode.mask {
        raw &= mask;
    }
    if decode.signed {
        i64::from(to_signed16(raw))
    } else {
        i64::from(raw)
    }
}

/// Two's-complement correction for a raw 16-bit value
///
/// Values above 0x7FFF have 0x10000 subtracted. Bits above 15 are ignored.
pub fn to_signed16(raw: u32) -> i32 {
    let raw = (raw & 0xFFFF) as i32;
    if raw > 0x7FFF {
        raw - 0x1_0000
    } else {
        raw
    }
}

/// Packed BCD byte to decimal
pub fn bcd_to_decimal(bcd: u8) -> u8 {
    (bcd >> 4) * 10 + (bcd & 0x0F)
}

/// Decimal (0-99) to packed BCD byte
pub fn decimal_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// MSB-first CRC-8 with the given polynomial and initial value
pub fn crc8(data: &[u8], polynomial: u8, init: u8) -> u8 {
    let mut crc = init;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ polynomial
            } else {
                crc << 1
            };
        }
    }
    crc
}
