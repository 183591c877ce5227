//! One-character numeric format codes used by parameter descriptors.
//!
//! The board describes each parameter's storage with a code borrowed from
//! C struct packing: `f` is a 4-byte float, `H` an unsigned 16-bit integer,
//! and so on. All values are little-endian.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::{ProtoError, Result};

/// 2^63, the first value past `i64::MAX`.
const I64_END: f64 = 9_223_372_036_854_775_808.0;
/// 2^64, the first value past `u64::MAX`.
const U64_END: f64 = 18_446_744_073_709_551_616.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamFormat {
    /// `c`: single unsigned byte.
    Char,
    /// `b`
    I8,
    /// `B`
    U8,
    /// `?`
    Bool,
    /// `h`
    I16,
    /// `H`
    U16,
    /// `i` or `l`
    I32,
    /// `I` or `L`
    U32,
    /// `q`
    I64,
    /// `Q`
    U64,
    /// `f`
    F32,
    /// `d`
    F64,
}

impl ParamFormat {
    pub fn from_code(code: char) -> Result<Self> {
        Ok(match code {
            'c' => ParamFormat::Char,
            'b' => ParamFormat::I8,
            'B' => ParamFormat::U8,
            '?' => ParamFormat::Bool,
            'h' => ParamFormat::I16,
            'H' => ParamFormat::U16,
            'i' | 'l' => ParamFormat::I32,
            'I' | 'L' => ParamFormat::U32,
            'q' => ParamFormat::I64,
            'Q' => ParamFormat::U64,
            'f' => ParamFormat::F32,
            'd' => ParamFormat::F64,
            other => return Err(ProtoError::UnknownFormat(other.to_string())),
        })
    }

    /// Parse an attribute value, which must be exactly one character.
    pub fn parse(value: &str) -> Result<Self> {
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => Self::from_code(code),
            _ => Err(ProtoError::UnknownFormat(value.to_string())),
        }
    }

    /// Canonical code for this format.
    pub const fn code(self) -> char {
        match self {
            ParamFormat::Char => 'c',
            ParamFormat::I8 => 'b',
            ParamFormat::U8 => 'B',
            ParamFormat::Bool => '?',
            ParamFormat::I16 => 'h',
            ParamFormat::U16 => 'H',
            ParamFormat::I32 => 'i',
            ParamFormat::U32 => 'I',
            ParamFormat::I64 => 'q',
            ParamFormat::U64 => 'Q',
            ParamFormat::F32 => 'f',
            ParamFormat::F64 => 'd',
        }
    }

    /// Width in bytes.
    pub const fn size(self) -> usize {
        match self {
            ParamFormat::Char | ParamFormat::I8 | ParamFormat::U8 | ParamFormat::Bool => 1,
            ParamFormat::I16 | ParamFormat::U16 => 2,
            ParamFormat::I32 | ParamFormat::U32 | ParamFormat::F32 => 4,
            ParamFormat::I64 | ParamFormat::U64 | ParamFormat::F64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, ParamFormat::F32 | ParamFormat::F64)
    }

    /// Decode a value of exactly [`size`](Self::size) bytes.
    ///
    /// Callers check the length first; a wrong-sized slice is truncated or
    /// reported as [`ProtoError::Truncated`].
    pub fn decode(self, bytes: &[u8]) -> Result<ParamValue> {
        let size = self.size();
        let raw = bytes.get(..size).ok_or(ProtoError::Truncated {
            what: "parameter value",
            needed: size,
            available: bytes.len(),
        })?;
        let mut le = [0u8; 8];
        le[..size].copy_from_slice(raw);

        Ok(match self {
            ParamFormat::Char | ParamFormat::U8 => ParamValue::UInt(u64::from(raw[0])),
            ParamFormat::I8 => ParamValue::Int(i64::from(raw[0] as i8)),
            ParamFormat::Bool => ParamValue::Bool(raw[0] != 0),
            ParamFormat::I16 => ParamValue::Int(i64::from(i16::from_le_bytes([raw[0], raw[1]]))),
            ParamFormat::U16 => ParamValue::UInt(u64::from(u16::from_le_bytes([raw[0], raw[1]]))),
            ParamFormat::I32 => {
                ParamValue::Int(i64::from(i32::from_le_bytes([le[0], le[1], le[2], le[3]])))
            }
            ParamFormat::U32 => {
                ParamValue::UInt(u64::from(u32::from_le_bytes([le[0], le[1], le[2], le[3]])))
            }
            ParamFormat::I64 => ParamValue::Int(i64::from_le_bytes(le)),
            ParamFormat::U64 => ParamValue::UInt(u64::from_le_bytes(le)),
            ParamFormat::F32 => {
                ParamValue::Float(f64::from(f32::from_le_bytes([le[0], le[1], le[2], le[3]])))
            }
            ParamFormat::F64 => ParamValue::Float(f64::from_le_bytes(le)),
        })
    }

    /// Encode `value` at this format's width.
    ///
    /// Float formats store the value as-is (narrowed to f32 for `f`). Every
    /// other format truncates toward zero first; the result must fit the
    /// integer range. For `?` any non-zero value is `true`.
    pub fn encode(self, value: f64, dst: &mut BytesMut) -> Result<()> {
        match self {
            ParamFormat::F32 => dst.put_f32_le(value as f32),
            ParamFormat::F64 => dst.put_f64_le(value),
            ParamFormat::Bool => {
                if value.is_nan() {
                    return Err(self.out_of_range(value));
                }
                dst.put_u8(u8::from(value.trunc() != 0.0));
            }
            ParamFormat::Char | ParamFormat::U8 => {
                dst.put_u8(self.integer(value, 0.0, f64::from(u8::MAX))? as u8)
            }
            ParamFormat::I8 => {
                dst.put_i8(self.integer(value, f64::from(i8::MIN), f64::from(i8::MAX))? as i8)
            }
            ParamFormat::I16 => {
                dst.put_i16_le(self.integer(value, f64::from(i16::MIN), f64::from(i16::MAX))? as i16)
            }
            ParamFormat::U16 => {
                dst.put_u16_le(self.integer(value, 0.0, f64::from(u16::MAX))? as u16)
            }
            ParamFormat::I32 => {
                dst.put_i32_le(self.integer(value, f64::from(i32::MIN), f64::from(i32::MAX))? as i32)
            }
            ParamFormat::U32 => {
                dst.put_u32_le(self.integer(value, 0.0, f64::from(u32::MAX))? as u32)
            }
            ParamFormat::I64 => dst.put_i64_le(self.wide_integer(value, -I64_END, I64_END)? as i64),
            ParamFormat::U64 => dst.put_u64_le(self.wide_integer(value, 0.0, U64_END)? as u64),
        }
        Ok(())
    }

    /// Encode an already-typed value; 64-bit integers keep full precision.
    pub fn encode_value(self, value: ParamValue, dst: &mut BytesMut) -> Result<()> {
        match (self, value) {
            (ParamFormat::I64, ParamValue::Int(v)) => dst.put_i64_le(v),
            (ParamFormat::U64, ParamValue::UInt(v)) => dst.put_u64_le(v),
            _ => return self.encode(value.as_f64(), dst),
        }
        Ok(())
    }

    fn integer(self, value: f64, min: f64, max: f64) -> Result<f64> {
        let truncated = value.trunc();
        if truncated >= min && truncated <= max {
            Ok(truncated)
        } else {
            Err(self.out_of_range(value))
        }
    }

    /// Like `integer`, but `end` is exclusive. `i64::MAX` and `u64::MAX`
    /// round up to the next power of two as f64.
    fn wide_integer(self, value: f64, min: f64, end: f64) -> Result<f64> {
        let truncated = value.trunc();
        if truncated >= min && truncated < end {
            Ok(truncated)
        } else {
            Err(self.out_of_range(value))
        }
    }

    fn out_of_range(self, value: f64) -> ProtoError {
        ProtoError::ValueOutOfRange {
            value,
            format: self,
        }
    }
}

impl fmt::Display for ParamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A decoded parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl ParamValue {
    /// The value widened to f64, as used by the encode side.
    pub fn as_f64(self) -> f64 {
        match self {
            ParamValue::Int(v) => v as f64,
            ParamValue::UInt(v) => v as f64,
            ParamValue::Float(v) => v,
            ParamValue::Bool(v) => f64::from(u8::from(v)),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::UInt(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
        }
    }
}
