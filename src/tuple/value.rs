use std::cmp::Ordering;
use std::fmt;

use bytes::{Buf, BufMut};

use crate::common::{ArborError, Result};

use super::DataType;

/// A typed key value. Each variant corresponds to a DataType.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    String(String),
    Float(f32),
    Boolean(bool),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Integer(_) => DataType::Integer,
            Value::String(_) => DataType::String,
            Value::Float(_) => DataType::Float,
            Value::Boolean(_) => DataType::Boolean,
        }
    }

    /// Total order between two values of the same type.
    ///
    /// Floats use the IEEE total order, strings compare bytewise and
    /// booleans order `false` before `true`. Values of different types are
    /// not comparable.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
            (Value::Float(a), Value::Float(b)) => Ok(a.total_cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
            (a, b) => Err(ArborError::InvalidArgument(format!(
                "cannot compare {} key with {} key",
                a.data_type(),
                b.data_type()
            ))),
        }
    }

    /// Parses a key of the given type from its text form.
    pub fn parse_as(text: &str, data_type: DataType) -> Result<Self> {
        let invalid = |e: &dyn fmt::Display| {
            ArborError::InvalidArgument(format!("'{}' is not a {} key: {}", text, data_type, e))
        };
        match data_type {
            DataType::Integer => text.parse().map(Value::Integer).map_err(|e| invalid(&e)),
            DataType::Float => text.parse().map(Value::Float).map_err(|e| invalid(&e)),
            DataType::Boolean => text.parse().map(Value::Boolean).map_err(|e| invalid(&e)),
            DataType::String => Ok(Value::String(text.to_string())),
        }
    }

    /// Number of bytes `encode` writes for this value.
    pub fn encoded_len(&self) -> usize {
        match self {
            Value::String(s) => 2 + s.len(),
            other => other.data_type().fixed_size().unwrap_or(0),
        }
    }

    /// Appends the binary form of this value.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Value::Integer(v) => buf.put_i32_le(*v),
            Value::Float(v) => buf.put_f32_le(*v),
            Value::Boolean(v) => buf.put_u8(u8::from(*v)),
            Value::String(s) => {
                let len = u16::try_from(s.len()).map_err(|_| {
                    ArborError::InvalidArgument(format!("string key of {} bytes", s.len()))
                })?;
                buf.put_u16_le(len);
                buf.put_slice(s.as_bytes());
            }
        }
        Ok(())
    }

    /// Reads one value of the given type, advancing the buffer.
    pub fn decode<B: Buf>(buf: &mut B, data_type: DataType) -> Result<Self> {
        let short = || ArborError::IndexCorrupted(format!("truncated {} key", data_type));
        match data_type {
            DataType::Integer => {
                if buf.remaining() < 4 {
                    return Err(short());
                }
                Ok(Value::Integer(buf.get_i32_le()))
            }
            DataType::Float => {
                if buf.remaining() < 4 {
                    return Err(short());
                }
                Ok(Value::Float(buf.get_f32_le()))
            }
            DataType::Boolean => {
                if buf.remaining() < 1 {
                    return Err(short());
                }
                Ok(Value::Boolean(buf.get_u8() != 0))
            }
            DataType::String => {
                if buf.remaining() < 2 {
                    return Err(short());
                }
                let len = buf.get_u16_le() as usize;
                if buf.remaining() < len {
                    return Err(short());
                }
                let mut bytes = vec![0u8; len];
                buf.copy_to_slice(&mut bytes);
                String::from_utf8(bytes)
                    .map(Value::String)
                    .map_err(|e| ArborError::IndexCorrupted(e.to_string()))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
