//! Typed database access layer.
//!
//! Values cross the driver boundary as [`Variant`]s: containers that hold any
//! SQL value and convert it only along the declared [`conversions`]. Engines
//! plug in through the traits in [`driver`] and are looked up by a
//! [`DriverSpec`] in a [`Registry`].

pub mod driver;
pub mod lexer;

mod cell;
mod connection;
mod convert;
mod diag;
mod environment;
mod lob;
mod numeric;
mod rows;
mod statement;
mod temporal;
mod types;
mod value;
mod variant;

pub use cell::{BackendCell, SharedCell};
pub use connection::{Connection, Transaction, TransactionError};
pub use convert::{can_convert, conversions, convert, ConvertError, ConvertFailure};
pub use diag::{DiagState, Diagnostic, Diagnostics, EngineError};
pub use driver::{DriverSpec, Options, Registry, RegistryError};
pub use environment::Environment;
pub use lob::{BlobStream, MemoStream};
pub use numeric::{Numeric, ParseNumericError};
pub use rows::{AdapterState, ColumnDescriptor, ColumnIndex, ResultSet};
pub use statement::{Statement, StatementState};
pub use temporal::{Date, Interval, ParseTemporalError, Time, Timestamp};
pub use types::{sql_type_name, type_name, Type};
pub use value::{FromValue, Value};
pub use variant::Variant;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Value{} is NULL", column_suffix(.column.as_deref()))]
    NullValue { column: Option<String> },

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("Cannot write to read-only {datatype} value{}", column_suffix(.column.as_deref()))]
    ReadOnly {
        column: Option<String>,
        datatype: Type,
    },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("{0} {1:?} not found")]
    NotFound(ObjectKind, String),

    #[error("Logic error: {0}")]
    Logic(#[from] LogicError),

    #[error("Database is busy: {0}")]
    Busy(String),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

fn column_suffix(column: Option<&str>) -> String {
    column.map(|c| format!(" of column {c:?}")).unwrap_or_default()
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NullValue { .. } => ErrorKind::NullValue,
            Self::Convert(_) => ErrorKind::Convert,
            Self::ReadOnly { .. } => ErrorKind::ReadOnly,
            Self::Engine(_) => ErrorKind::Engine,
            Self::NotFound(..) => ErrorKind::NotFound,
            Self::Logic(_) => ErrorKind::Logic,
            Self::Busy(_) => ErrorKind::Busy,
            Self::Transaction(_) => ErrorKind::Transaction,
            Self::Registry(_) => ErrorKind::Registry,
        }
    }

    /// The engine diagnostic, if this error was reported by an engine.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::Engine(e) => Some(e.diagnostic()),
            _ => None,
        }
    }

    pub fn sqlstate(&self) -> Option<&str> {
        self.diagnostic().map(Diagnostic::sqlstate)
    }

    pub(crate) fn engine(sqlstate: &str, message: impl Into<String>) -> Self {
        Self::Engine(Diagnostic::error(sqlstate, message).into())
    }

    /// Attaches a column name to value errors that lack one.
    pub(crate) fn in_column(self, name: Option<&str>) -> Self {
        match self {
            Self::NullValue { column: None } => Self::NullValue {
                column: name.map(ToOwned::to_owned),
            },
            Self::ReadOnly {
                column: None,
                datatype,
            } => Self::ReadOnly {
                column: name.map(ToOwned::to_owned),
                datatype,
            },
            Self::Convert(e) => Self::Convert(e.with_column(name)),
            e => e,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NullValue,
    Convert,
    ReadOnly,
    Engine,
    NotFound,
    Logic,
    Busy,
    Transaction,
    Registry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Column,
    Parameter,
    Savepoint,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Column => "Column",
            Self::Parameter => "Parameter",
            Self::Savepoint => "Savepoint",
        })
    }
}

/// An API call made in the wrong order or with an impossible argument.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogicError {
    #[error("Cannot {operation} a statement that is {state}")]
    InvalidState {
        operation: &'static str,
        state: StatementState,
    },

    #[error("Parameter {0} is not bound")]
    UnboundParameter(usize),

    #[error("Column {0} has no current row")]
    NoCurrentRow(usize),

    #[error("Connection is not open")]
    NotConnected,

    #[error("Connection is already open")]
    AlreadyConnected,

    #[error("Expected a single statement")]
    MultipleStatements,

    #[error("{0} is not supported by this engine")]
    NotSupported(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
