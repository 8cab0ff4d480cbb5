use crate::{
    lexer,
    numeric::Numeric,
    temporal::{Date, Interval, Time, Timestamp},
    Type,
};
use serde::{Deserialize, Serialize};

/// Owned storage of a single non-null SQL value.
///
/// There is one variant per native representation. NULL is not a value; it is
/// tracked by the [`Variant`](crate::Variant) holding the storage.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Boolean(bool),
    Text(String),
    Blob(Vec<u8>),
    Memo(String),
    Numeric(Numeric),
    Float(f32),
    Double(f64),
    Date(Date),
    Time(Time),
    Timestamp(Timestamp),
    Interval(Interval),
    Custom { tag: u32, bytes: Vec<u8> },
}

impl Value {
    pub fn datatype(&self) -> Type {
        match self {
            Self::Int8(_) => Type::Int8,
            Self::UInt8(_) => Type::UInt8,
            Self::Int16(_) => Type::Int16,
            Self::UInt16(_) => Type::UInt16,
            Self::Int32(_) => Type::Int32,
            Self::UInt32(_) => Type::UInt32,
            Self::Int64(_) => Type::Int64,
            Self::UInt64(_) => Type::UInt64,
            Self::Boolean(_) => Type::Boolean,
            Self::Text(_) => Type::VarChar,
            Self::Blob(_) => Type::Blob,
            Self::Memo(_) => Type::Memo,
            Self::Numeric(_) => Type::Numeric,
            Self::Float(_) => Type::Float,
            Self::Double(_) => Type::Double,
            Self::Date(_) => Type::Date,
            Self::Time(_) => Type::Time,
            Self::Timestamp(_) => Type::Timestamp,
            Self::Interval(_) => Type::Interval,
            Self::Custom { tag, .. } => Type::Custom(*tag),
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) | Self::Memo(s) => f.write_str(&lexer::quote(s, '\'')),
            Self::Date(d) => write!(f, "DATE '{d}'"),
            Self::Time(t) => write!(f, "TIME '{t}'"),
            Self::Timestamp(ts) => write!(f, "TIMESTAMP '{ts}'"),
            Self::Interval(i) => write!(f, "INTERVAL '{i}'"),
            Self::Custom { tag, bytes } => write!(f, "CUSTOM({tag}) {bytes:?}"),
            value => std::fmt::Display::fmt(value, f),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int8(v) => v.fmt(f),
            Self::UInt8(v) => v.fmt(f),
            Self::Int16(v) => v.fmt(f),
            Self::UInt16(v) => v.fmt(f),
            Self::Int32(v) => v.fmt(f),
            Self::UInt32(v) => v.fmt(f),
            Self::Int64(v) => v.fmt(f),
            Self::UInt64(v) => v.fmt(f),
            Self::Boolean(v) => v.fmt(f),
            Self::Text(s) | Self::Memo(s) => s.fmt(f),
            Self::Blob(bytes) | Self::Custom { bytes, .. } => {
                f.write_str("\\x")?;
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Numeric(n) => n.fmt(f),
            Self::Float(v) => v.fmt(f),
            Self::Double(v) => v.fmt(f),
            Self::Date(d) => d.fmt(f),
            Self::Time(t) => t.fmt(f),
            Self::Timestamp(ts) => ts.fmt(f),
            Self::Interval(i) => i.fmt(f),
        }
    }
}

/// A Rust type that can be extracted from a [`Value`] of its own tag.
///
/// `TYPE` is the tag the source value is converted to before extraction.
pub trait FromValue: Sized {
    const TYPE: Type;

    /// Takes the payload out of a value already converted to `TYPE`.
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! impl_value_conversions {
    ($ty:ty, $variant:ident, $tag:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Self::$variant(v)
            }
        }

        impl FromValue for $ty {
            const TYPE: Type = Type::$tag;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_value_conversions!(i8, Int8, Int8);
impl_value_conversions!(u8, UInt8, UInt8);
impl_value_conversions!(i16, Int16, Int16);
impl_value_conversions!(u16, UInt16, UInt16);
impl_value_conversions!(i32, Int32, Int32);
impl_value_conversions!(u32, UInt32, UInt32);
impl_value_conversions!(i64, Int64, Int64);
impl_value_conversions!(u64, UInt64, UInt64);
impl_value_conversions!(bool, Boolean, Boolean);
impl_value_conversions!(String, Text, VarChar);
impl_value_conversions!(Vec<u8>, Blob, Blob);
impl_value_conversions!(Numeric, Numeric, Numeric);
impl_value_conversions!(f32, Float, Float);
impl_value_conversions!(f64, Double, Double);
impl_value_conversions!(Date, Date, Date);
impl_value_conversions!(Time, Time, Time);
impl_value_conversions!(Timestamp, Timestamp, Timestamp);
impl_value_conversions!(Interval, Interval, Interval);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Blob(v.to_vec())
    }
}
