//! The closed AMQP type vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A type name outside the supported vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown AMQP type `{0}`")]
pub struct UnknownTypeError(pub String);

/// AMQP 1.0 primitive types exercised by the suite.
///
/// `Array` is a pseudo-type: its test values are synthesized from the other
/// entries rather than authored by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmqpType {
    Null,
    Boolean,
    Ubyte,
    Ushort,
    Uint,
    Ulong,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal32,
    Decimal64,
    Decimal128,
    Char,
    Timestamp,
    Uuid,
    Binary,
    String,
    Symbol,
    List,
    Map,
    Array,
}

impl AmqpType {
    /// Every type in the vocabulary, in declaration order.
    pub const ALL: [AmqpType; 24] = [
        AmqpType::Null,
        AmqpType::Boolean,
        AmqpType::Ubyte,
        AmqpType::Ushort,
        AmqpType::Uint,
        AmqpType::Ulong,
        AmqpType::Byte,
        AmqpType::Short,
        AmqpType::Int,
        AmqpType::Long,
        AmqpType::Float,
        AmqpType::Double,
        AmqpType::Decimal32,
        AmqpType::Decimal64,
        AmqpType::Decimal128,
        AmqpType::Char,
        AmqpType::Timestamp,
        AmqpType::Uuid,
        AmqpType::Binary,
        AmqpType::String,
        AmqpType::Symbol,
        AmqpType::List,
        AmqpType::Map,
        AmqpType::Array,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AmqpType::Null => "null",
            AmqpType::Boolean => "boolean",
            AmqpType::Ubyte => "ubyte",
            AmqpType::Ushort => "ushort",
            AmqpType::Uint => "uint",
            AmqpType::Ulong => "ulong",
            AmqpType::Byte => "byte",
            AmqpType::Short => "short",
            AmqpType::Int => "int",
            AmqpType::Long => "long",
            AmqpType::Float => "float",
            AmqpType::Double => "double",
            AmqpType::Decimal32 => "decimal32",
            AmqpType::Decimal64 => "decimal64",
            AmqpType::Decimal128 => "decimal128",
            AmqpType::Char => "char",
            AmqpType::Timestamp => "timestamp",
            AmqpType::Uuid => "uuid",
            AmqpType::Binary => "binary",
            AmqpType::String => "string",
            AmqpType::Symbol => "symbol",
            AmqpType::List => "list",
            AmqpType::Map => "map",
            AmqpType::Array => "array",
        }
    }

    /// Resolve a tag found inside a composite value.
    ///
    /// Besides the canonical names this accepts `none` and the empty tag, both
    /// of which denote the null type.
    pub fn from_tag(tag: &str) -> Option<AmqpType> {
        match tag {
            "" | "none" => Some(AmqpType::Null),
            other => other.parse().ok(),
        }
    }

    /// Lists, maps and arrays carry structure instead of a scalar literal.
    pub fn is_composite(&self) -> bool {
        matches!(self, AmqpType::List | AmqpType::Map | AmqpType::Array)
    }
}

impl fmt::Display for AmqpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AmqpType {
    type Err = UnknownTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AmqpType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTypeError(s.to_string()))
    }
}
