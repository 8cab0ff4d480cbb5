use serde::{Deserialize, Serialize};

/// Logical SQL datatype of a value.
///
/// Every non-null [`Value`](crate::Value) maps to exactly one tag. `Char` and
/// `VarChar` share the same native representation and differ only in how a
/// backend declares the column.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Unknown,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Boolean,
    Char,
    VarChar,
    Blob,
    Memo,
    Numeric,
    Float,
    Double,
    Date,
    Time,
    Timestamp,
    Interval,

    /// Engine-specific extension type identified by an engine-chosen number.
    Custom(u32),
}

pub(crate) const INTEGERS: &[Type] = &[
    Type::Int8,
    Type::UInt8,
    Type::Int16,
    Type::UInt16,
    Type::Int32,
    Type::UInt32,
    Type::Int64,
    Type::UInt64,
];

impl Type {
    /// Debug name of the tag, e.g. `INT32`.
    pub fn name(self) -> String {
        match self {
            Self::Custom(id) => format!("CUSTOM({id})"),
            ty => ty.static_name().to_owned(),
        }
    }

    fn static_name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Int8 => "INT8",
            Self::UInt8 => "UINT8",
            Self::Int16 => "INT16",
            Self::UInt16 => "UINT16",
            Self::Int32 => "INT32",
            Self::UInt32 => "UINT32",
            Self::Int64 => "INT64",
            Self::UInt64 => "UINT64",
            Self::Boolean => "BOOLEAN",
            Self::Char => "CHAR",
            Self::VarChar => "VARCHAR",
            Self::Blob => "BLOB",
            Self::Memo => "MEMO",
            Self::Numeric => "NUMERIC",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Interval => "INTERVAL",
            Self::Custom(_) => "CUSTOM",
        }
    }

    /// Name of the type as it would be spelled in SQL DDL.
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Int8 => "TINYINT",
            Self::UInt8 => "TINYINT UNSIGNED",
            Self::Int16 => "SMALLINT",
            Self::UInt16 => "SMALLINT UNSIGNED",
            Self::Int32 => "INTEGER",
            Self::UInt32 => "INTEGER UNSIGNED",
            Self::Int64 => "BIGINT",
            Self::UInt64 => "BIGINT UNSIGNED",
            Self::Boolean => "BOOLEAN",
            Self::Char => "CHAR",
            Self::VarChar => "VARCHAR",
            Self::Blob => "BLOB",
            Self::Memo => "CLOB",
            Self::Numeric => "NUMERIC",
            Self::Float => "REAL",
            Self::Double => "DOUBLE PRECISION",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Interval => "INTERVAL",
            Self::Custom(_) => "CUSTOM",
        }
    }

    /// The Rust type a value of this tag is held as.
    pub fn native_name(self) -> &'static str {
        match self {
            Self::Unknown => "()",
            Self::Int8 => "i8",
            Self::UInt8 => "u8",
            Self::Int16 => "i16",
            Self::UInt16 => "u16",
            Self::Int32 => "i32",
            Self::UInt32 => "u32",
            Self::Int64 => "i64",
            Self::UInt64 => "u64",
            Self::Boolean => "bool",
            Self::Char | Self::VarChar | Self::Memo => "String",
            Self::Blob | Self::Custom(_) => "Vec<u8>",
            Self::Numeric => "Numeric",
            Self::Float => "f32",
            Self::Double => "f64",
            Self::Date => "Date",
            Self::Time => "Time",
            Self::Timestamp => "Timestamp",
            Self::Interval => "Interval",
        }
    }

    pub fn is_integer(self) -> bool {
        INTEGERS.contains(&self)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Float
                | Self::Double
                | Self::Numeric
        )
    }

    pub fn is_character(self) -> bool {
        matches!(self, Self::Char | Self::VarChar)
    }

    pub fn is_lob(self) -> bool {
        matches!(self, Self::Blob | Self::Memo)
    }

    /// Natural byte width of fixed-size types, used as the default column size.
    pub(crate) fn fixed_size(self) -> Option<usize> {
        Some(match self {
            Self::Int8 | Self::UInt8 | Self::Boolean => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float | Self::Date => 4,
            Self::Int64 | Self::UInt64 | Self::Double | Self::Time => 8,
            Self::Timestamp | Self::Interval | Self::Numeric => 16,
            _ => return None,
        })
    }
}

impl std::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Custom(id) => write!(f, "CUSTOM({id})"),
            ty => f.write_str(ty.sql_name()),
        }
    }
}

/// Debug name of a datatype tag.
pub fn type_name(ty: Type) -> String {
    ty.name()
}

/// SQL name of a datatype tag.
pub fn sql_type_name(ty: Type) -> &'static str {
    ty.sql_name()
}
