use std::fmt;
use std::str::FromStr;

use crate::common::{ArborError, Result};

/// The key types an index can be declared over.
/// The discriminant is the tag stored in the index header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit signed integer: 4 bytes, little-endian
    Integer,

    /// UTF-8 string, stored as length (2 bytes) + data
    String,

    /// 32-bit floating point: 4 bytes, IEEE 754
    Float,

    /// Boolean: 1 byte (0 = false, 1 = true)
    Boolean,
}

impl DataType {
    /// Returns the tag written to the index header.
    pub fn type_id(&self) -> i32 {
        match self {
            DataType::Integer => 0,
            DataType::String => 1,
            DataType::Float => 2,
            DataType::Boolean => 3,
        }
    }

    pub fn from_type_id(type_id: i32) -> Result<Self> {
        match type_id {
            0 => Ok(DataType::Integer),
            1 => Ok(DataType::String),
            2 => Ok(DataType::Float),
            3 => Ok(DataType::Boolean),
            other => Err(ArborError::IndexCorrupted(format!(
                "unknown key type tag {}",
                other
            ))),
        }
    }

    /// Returns the encoded size of a key, or None for strings.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            DataType::Integer => Some(4),
            DataType::Float => Some(4),
            DataType::Boolean => Some(1),
            DataType::String => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::String => write!(f, "STRING"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

impl FromStr for DataType {
    type Err = ArborError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(DataType::Integer),
            "string" | "str" => Ok(DataType::String),
            "float" => Ok(DataType::Float),
            "boolean" | "bool" => Ok(DataType::Boolean),
            other => Err(ArborError::InvalidArgument(format!(
                "unknown key type '{}'",
                other
            ))),
        }
    }
}
