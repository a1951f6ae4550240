use crate::error::{OpcError, OpcResult};
use opcua::types::{DataTypeId, UAString, Variant};
use std::fmt;

/// Typed value held by a device register.
///
/// Mirrors the handful of OPC UA built-in types the device fleet uses.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceValue {
    /// Boolean (`Boolean`).
    Bool(bool),
    /// Integer, encoded as `Int32` when it fits and `Int64` otherwise.
    Int(i64),
    /// 64-bit float (`Double`).
    Float(f64),
    /// String (`String`).
    Text(String),
    /// Null variant.
    Empty,
}

impl DeviceValue {
    /// OPC UA data type node for a register initialised with this value.
    pub fn data_type(&self) -> DataTypeId {
        match self {
            Self::Bool(_) => DataTypeId::Boolean,
            Self::Int(_) => DataTypeId::Int32,
            Self::Float(_) => DataTypeId::Double,
            Self::Text(_) => DataTypeId::String,
            Self::Empty => DataTypeId::BaseDataType,
        }
    }

    pub fn to_variant(&self) -> Variant {
        match self {
            Self::Bool(b) => Variant::Boolean(*b),
            Self::Int(i) => i32::try_from(*i).map_or(Variant::Int64(*i), Variant::Int32),
            Self::Float(f) => Variant::Double(*f),
            Self::Text(s) => Variant::String(UAString::from(s.as_str())),
            Self::Empty => Variant::Empty,
        }
    }

    /// Whether `other` may replace `self` without changing the register type.
    pub fn same_kind(&self, other: &Self) -> bool {
        matches!(self, Self::Empty)
            || matches!(other, Self::Empty)
            || std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Short type name used in messages.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Boolean",
            Self::Int(_) => "Int32",
            Self::Float(_) => "Double",
            Self::Text(_) => "String",
            Self::Empty => "Null",
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Parses user input into a value of the same kind as `self`.
    ///
    /// Used when writing a register whose current value determines the type
    /// the server will accept.
    pub fn parse_like(&self, input: &str) -> OpcResult<Self> {
        let input = input.trim();
        let parsed = match self {
            Self::Bool(_) => parse_bool(input).map(Self::Bool),
            Self::Int(_) => input.parse::<i64>().ok().map(Self::Int),
            Self::Float(_) => input.parse::<f64>().ok().map(Self::Float),
            Self::Text(_) => Some(Self::Text(input.to_string())),
            Self::Empty => Some(Self::infer(input)),
        };
        tracing::debug!(input = %input, target_kind = self.kind_name(), parsed = ?parsed, "parse_like");
        parsed.ok_or_else(|| {
            OpcError::Conversion(format!(
                "'{input}' is not a valid {} value",
                self.kind_name()
            ))
        })
    }

    /// Infers a value from free text (int -> float -> bool -> string).
    pub fn infer(input: &str) -> Self {
        if let Ok(i) = input.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = input.parse::<f64>() {
            return Self::Float(f);
        }
        if let Some(b) = parse_bool(input) {
            return Self::Bool(b);
        }
        Self::Text(input.to_string())
    }
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.to_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}

impl fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Empty => write!(f, "(null)"),
        }
    }
}

impl From<&Variant> for DeviceValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(variant: &Variant) -> Self {
        match variant {
            Variant::Empty => Self::Empty,
            Variant::Boolean(b) => Self::Bool(*b),
            Variant::SByte(i) => Self::Int(i64::from(*i)),
            Variant::Byte(i) => Self::Int(i64::from(*i)),
            Variant::Int16(i) => Self::Int(i64::from(*i)),
            Variant::UInt16(i) => Self::Int(i64::from(*i)),
            Variant::Int32(i) => Self::Int(i64::from(*i)),
            Variant::UInt32(i) => Self::Int(i64::from(*i)),
            Variant::Int64(i) => Self::Int(*i),
            Variant::UInt64(i) => i64::try_from(*i).map_or(Self::Float(*i as f64), Self::Int),
            Variant::Float(v) => Self::Float(f64::from(*v)),
            Variant::Double(v) => Self::Float(*v),
            Variant::String(s) => Self::Text(s.as_ref().to_string()),
            other => Self::Text(format!("{other:?}")),
        }
    }
}

impl From<bool> for DeviceValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for DeviceValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<&str> for DeviceValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}
