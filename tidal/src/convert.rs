//! Declared conversions between datatypes.
//!
//! Each source type declares the closed set of targets it converts to
//! ([`conversions`]). Anything outside that set fails with
//! [`ConvertFailure::Unsupported`] instead of being coerced, and narrowing
//! conversions are range-checked instead of truncated.

use crate::{
    numeric::Numeric,
    temporal::{Date, Interval, Time, Timestamp},
    FromValue, Type, Value,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertFailure {
    #[error("conversion is not supported")]
    Unsupported,

    #[error("value out of range")]
    OutOfRange,

    #[error("fractional digits would be lost")]
    Inexact,

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Cannot convert {from} to {to}{}: {reason}",
    .column.as_ref().map(|c| format!(" in column {c:?}")).unwrap_or_default()
)]
pub struct ConvertError {
    from: Type,
    to: Type,
    column: Option<String>,
    reason: ConvertFailure,
}

impl ConvertError {
    pub(crate) fn new(from: Type, to: Type, reason: ConvertFailure) -> Self {
        Self {
            from,
            to,
            column: None,
            reason,
        }
    }

    pub(crate) fn with_column(mut self, column: Option<&str>) -> Self {
        if self.column.is_none() {
            self.column = column.map(ToOwned::to_owned);
        }
        self
    }

    pub fn source_type(&self) -> Type {
        self.from
    }

    pub fn target_type(&self) -> Type {
        self.to
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn reason(&self) -> &ConvertFailure {
        &self.reason
    }
}

const INTEGER_TARGETS: &[Type] = &[
    Type::Int8,
    Type::UInt8,
    Type::Int16,
    Type::UInt16,
    Type::Int32,
    Type::UInt32,
    Type::Int64,
    Type::UInt64,
    Type::Boolean,
    Type::Float,
    Type::Double,
    Type::Numeric,
    Type::Char,
    Type::VarChar,
    Type::Timestamp,
];

const BOOLEAN_TARGETS: &[Type] = &[
    Type::Int8,
    Type::UInt8,
    Type::Int16,
    Type::UInt16,
    Type::Int32,
    Type::UInt32,
    Type::Int64,
    Type::UInt64,
    Type::Char,
    Type::VarChar,
];

const TEXT_TARGETS: &[Type] = &[
    Type::Int8,
    Type::UInt8,
    Type::Int16,
    Type::UInt16,
    Type::Int32,
    Type::UInt32,
    Type::Int64,
    Type::UInt64,
    Type::Boolean,
    Type::Float,
    Type::Double,
    Type::Numeric,
    Type::Char,
    Type::VarChar,
    Type::Memo,
    Type::Blob,
    Type::Date,
    Type::Time,
    Type::Timestamp,
    Type::Interval,
];

const NUMERIC_TARGETS: &[Type] = &[
    Type::Int8,
    Type::UInt8,
    Type::Int16,
    Type::UInt16,
    Type::Int32,
    Type::UInt32,
    Type::Int64,
    Type::UInt64,
    Type::Float,
    Type::Double,
    Type::Char,
    Type::VarChar,
];

const FLOAT_TARGETS: &[Type] = &[
    Type::Int8,
    Type::UInt8,
    Type::Int16,
    Type::UInt16,
    Type::Int32,
    Type::UInt32,
    Type::Int64,
    Type::UInt64,
    Type::Float,
    Type::Double,
    Type::Numeric,
    Type::Char,
    Type::VarChar,
];

/// Targets declared by `source`, not counting the identity conversion,
/// which every type supports.
pub fn conversions(source: Type) -> &'static [Type] {
    match source {
        ty if ty.is_integer() => INTEGER_TARGETS,
        Type::Boolean => BOOLEAN_TARGETS,
        Type::Char | Type::VarChar => TEXT_TARGETS,
        Type::Memo => &[Type::Char, Type::VarChar],
        Type::Numeric => NUMERIC_TARGETS,
        Type::Float | Type::Double => FLOAT_TARGETS,
        Type::Date | Type::Time => &[Type::Timestamp, Type::Char, Type::VarChar],
        Type::Timestamp => &[Type::Date, Type::Time, Type::Int64, Type::Char, Type::VarChar],
        Type::Interval => &[Type::Char, Type::VarChar],
        Type::Custom(_) => &[Type::Blob],
        _ => &[],
    }
}

pub fn can_convert(source: Type, target: Type) -> bool {
    (source == target && source != Type::Unknown) || conversions(source).contains(&target)
}

/// Converts `value` to `target`.
///
/// The identity conversion returns an exact copy.
pub fn convert(value: &Value, target: Type) -> Result<Value, ConvertError> {
    let from = value.datatype();
    if from == target {
        return Ok(value.clone());
    }
    if !can_convert(from, target) {
        return Err(ConvertError::new(from, target, ConvertFailure::Unsupported));
    }
    convert_declared(value, target).map_err(|reason| ConvertError::new(from, target, reason))
}

/// Converts `value` to `T::TYPE` and takes the payload.
pub(crate) fn extract<T: FromValue>(value: &Value) -> Result<T, ConvertError> {
    let converted = convert(value, T::TYPE)?;
    let from = converted.datatype();
    T::from_value(converted).ok_or_else(|| unsupported(from, T::TYPE))
}

pub(crate) fn unsupported(from: Type, to: Type) -> ConvertError {
    ConvertError::new(from, to, ConvertFailure::Unsupported)
}

fn convert_declared(value: &Value, target: Type) -> Result<Value, ConvertFailure> {
    if let (Value::Boolean(b), Type::Char | Type::VarChar) = (value, target) {
        return Ok(Value::Text(b.to_string()));
    }
    if let Some(i) = integer_of(value) {
        return from_integer(i, target);
    }
    match value {
        Value::Text(s) => from_text(s, target),
        Value::Memo(s) => Ok(Value::Text(s.clone())),
        Value::Numeric(n) => match target {
            ty if ty.is_integer() => integer_value(ty, n.to_integer().ok_or(ConvertFailure::Inexact)?),
            Type::Float => narrow_to_f32(n.to_f64()),
            Type::Double => Ok(Value::Double(n.to_f64())),
            _ => Ok(Value::Text(n.to_string())),
        },
        Value::Float(f) => match target {
            Type::Double => Ok(Value::Double(f64::from(*f))),
            Type::Numeric => parse_numeric(&f.to_string()),
            ty if ty.is_integer() => from_float(f64::from(*f), ty),
            _ => Ok(Value::Text(f.to_string())),
        },
        Value::Double(d) => match target {
            Type::Float => narrow_to_f32(*d),
            Type::Numeric => Numeric::from_f64(*d)
                .map(Value::Numeric)
                .ok_or(ConvertFailure::OutOfRange),
            ty if ty.is_integer() => from_float(*d, ty),
            _ => Ok(Value::Text(d.to_string())),
        },
        Value::Date(d) => match target {
            Type::Timestamp => Ok(Value::Timestamp((*d).into())),
            _ => Ok(Value::Text(d.to_string())),
        },
        Value::Time(t) => match target {
            Type::Timestamp => Ok(Value::Timestamp((*t).into())),
            _ => Ok(Value::Text(t.to_string())),
        },
        Value::Timestamp(ts) => match target {
            Type::Date => Ok(Value::Date((*ts).into())),
            Type::Time => Ok(Value::Time((*ts).into())),
            Type::Int64 if ts.nanos() != 0 => Err(ConvertFailure::Inexact),
            Type::Int64 => Ok(Value::Int64(ts.to_unix())),
            _ => Ok(Value::Text(ts.to_string())),
        },
        Value::Interval(i) => Ok(Value::Text(i.to_string())),
        Value::Custom { bytes, .. } => Ok(Value::Blob(bytes.clone())),
        _ => Err(ConvertFailure::Unsupported),
    }
}

/// Integer payload of integer and boolean values.
fn integer_of(value: &Value) -> Option<i128> {
    Some(match value {
        Value::Int8(v) => (*v).into(),
        Value::UInt8(v) => (*v).into(),
        Value::Int16(v) => (*v).into(),
        Value::UInt16(v) => (*v).into(),
        Value::Int32(v) => (*v).into(),
        Value::UInt32(v) => (*v).into(),
        Value::Int64(v) => (*v).into(),
        Value::UInt64(v) => (*v).into(),
        Value::Boolean(v) => i128::from(*v),
        _ => return None,
    })
}

fn from_integer(i: i128, target: Type) -> Result<Value, ConvertFailure> {
    match target {
        ty if ty.is_integer() => integer_value(ty, i),
        Type::Boolean => Ok(Value::Boolean(i != 0)),
        Type::Float => {
            let f = i as f32;
            (f as i128 == i)
                .then_some(Value::Float(f))
                .ok_or(ConvertFailure::Inexact)
        }
        Type::Double => {
            let d = i as f64;
            (d as i128 == i)
                .then_some(Value::Double(d))
                .ok_or(ConvertFailure::Inexact)
        }
        Type::Numeric => Ok(Value::Numeric(Numeric::from_integer(i))),
        Type::Timestamp => i64::try_from(i)
            .ok()
            .and_then(Timestamp::from_unix)
            .map(Value::Timestamp)
            .ok_or(ConvertFailure::OutOfRange),
        Type::Char | Type::VarChar => Ok(Value::Text(i.to_string())),
        _ => Err(ConvertFailure::Unsupported),
    }
}

fn integer_value(target: Type, i: i128) -> Result<Value, ConvertFailure> {
    let out_of_range = |_| ConvertFailure::OutOfRange;
    Ok(match target {
        Type::Int8 => Value::Int8(i.try_into().map_err(out_of_range)?),
        Type::UInt8 => Value::UInt8(i.try_into().map_err(out_of_range)?),
        Type::Int16 => Value::Int16(i.try_into().map_err(out_of_range)?),
        Type::UInt16 => Value::UInt16(i.try_into().map_err(out_of_range)?),
        Type::Int32 => Value::Int32(i.try_into().map_err(out_of_range)?),
        Type::UInt32 => Value::UInt32(i.try_into().map_err(out_of_range)?),
        Type::Int64 => Value::Int64(i.try_into().map_err(out_of_range)?),
        Type::UInt64 => Value::UInt64(i.try_into().map_err(out_of_range)?),
        _ => return Err(ConvertFailure::Unsupported),
    })
}

fn from_float(f: f64, target: Type) -> Result<Value, ConvertFailure> {
    if !f.is_finite() || f.abs() >= 2f64.powi(127) {
        return Err(ConvertFailure::OutOfRange);
    }
    if f.fract() != 0.0 {
        return Err(ConvertFailure::Inexact);
    }
    integer_value(target, f as i128)
}

fn narrow_to_f32(d: f64) -> Result<Value, ConvertFailure> {
    if d.is_finite() && d.abs() > f64::from(f32::MAX) {
        return Err(ConvertFailure::OutOfRange);
    }
    Ok(Value::Float(d as f32))
}

fn parse_numeric(s: &str) -> Result<Value, ConvertFailure> {
    s.parse::<Numeric>()
        .map(Value::Numeric)
        .map_err(|e| ConvertFailure::Invalid(e.to_string()))
}

fn from_text(s: &str, target: Type) -> Result<Value, ConvertFailure> {
    let invalid = |e: &dyn std::fmt::Display| ConvertFailure::Invalid(e.to_string());
    match target {
        ty if ty.is_integer() => {
            let i: i128 = s.trim().parse().map_err(|e| invalid(&e))?;
            integer_value(ty, i)
        }
        Type::Boolean => parse_bool(s)
            .map(Value::Boolean)
            .ok_or_else(|| ConvertFailure::Invalid(format!("invalid boolean {s:?}"))),
        Type::Float => s.trim().parse().map(Value::Float).map_err(|e| invalid(&e)),
        Type::Double => s.trim().parse().map(Value::Double).map_err(|e| invalid(&e)),
        Type::Numeric => parse_numeric(s),
        Type::Char | Type::VarChar => Ok(Value::Text(s.to_owned())),
        Type::Memo => Ok(Value::Memo(s.to_owned())),
        Type::Blob => Ok(Value::Blob(s.as_bytes().to_vec())),
        Type::Date => s.parse::<Date>().map(Value::Date).map_err(|e| invalid(&e)),
        Type::Time => s.parse::<Time>().map(Value::Time).map_err(|e| invalid(&e)),
        Type::Timestamp => s
            .parse::<Timestamp>()
            .map(Value::Timestamp)
            .map_err(|e| invalid(&e)),
        Type::Interval => s
            .parse::<Interval>()
            .map(Value::Interval)
            .map_err(|e| invalid(&e)),
        _ => Err(ConvertFailure::Unsupported),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if s == "1"
        || s.eq_ignore_ascii_case("t")
        || s.eq_ignore_ascii_case("true")
        || s.eq_ignore_ascii_case("y")
        || s.eq_ignore_ascii_case("yes")
        || s.eq_ignore_ascii_case("on")
    {
        Some(true)
    } else if s == "0"
        || s.eq_ignore_ascii_case("f")
        || s.eq_ignore_ascii_case("false")
        || s.eq_ignore_ascii_case("n")
        || s.eq_ignore_ascii_case("no")
        || s.eq_ignore_ascii_case("off")
    {
        Some(false)
    } else {
        None
    }
}

