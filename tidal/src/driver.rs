//! The contract between the access layer and engine drivers.
//!
//! An [`Engine`] opens [`ConnectionBackend`]s, which create
//! [`StatementBackend`]s. Backends report failures as [`Error`]s; warnings and
//! informational records are queued and drained by the access layer through
//! `take_diagnostics` after every call.

pub mod memory;

use crate::{cell::BackendCell, ColumnDescriptor, Diagnostic, Error, LogicError, Result, Value, Variant};
use std::{collections::BTreeMap, sync::Arc};

/// Connect options such as `database`, `username` and `password`.
pub type Options = BTreeMap<String, Variant>;

/// Identifies a transaction within one connection.
pub type TransactionId = u64;

pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    fn connect(&self, options: &Options) -> Result<Box<dyn ConnectionBackend>>;
}

pub trait ConnectionBackend {
    fn new_statement(&mut self) -> Result<Box<dyn StatementBackend>>;

    fn begin(&mut self) -> Result<TransactionId>;

    /// Fails with a [`TransactionError`](crate::TransactionError) if `txn`
    /// is not the open transaction.
    fn commit(&mut self, txn: TransactionId) -> Result<()>;

    fn rollback(&mut self, txn: TransactionId) -> Result<()>;

    fn savepoint(&mut self, txn: TransactionId, name: &str) -> Result<()>;

    fn rollback_to(&mut self, txn: TransactionId, name: &str) -> Result<()>;

    fn disconnect(&mut self) -> Result<()>;

    fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        Vec::new()
    }
}

/// The outcome of executing a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    /// Rows inserted, updated or deleted.
    pub affected_rows: u64,

    /// Layout of the result rows, empty if the statement returns no rows.
    pub columns: Vec<ColumnDescriptor>,
}

pub trait StatementBackend {
    /// Prepares `sql` and returns the number of parameters.
    fn prepare(&mut self, sql: &str) -> Result<usize>;

    /// Executes the prepared statement. `None` passes NULL.
    fn execute(&mut self, params: &[Option<Value>]) -> Result<Execution>;

    /// A cell observing column `column` of the current row.
    ///
    /// The cell stays valid for the life of the backend and follows the
    /// current row of every later execution with the same column layout.
    fn cell(&mut self, column: usize) -> Result<Box<dyn BackendCell>>;

    /// Moves to the next row. Returns `false` past the last row.
    fn fetch(&mut self) -> Result<bool>;

    /// Discards the prepared statement and any pending rows.
    fn close(&mut self);

    fn cancel(&mut self) -> Result<()> {
        Err(LogicError::NotSupported("Cancellation").into())
    }

    fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        Vec::new()
    }
}

/// `<engine>:<driver>[:<libpath>]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DriverSpec {
    engine: String,
    driver: String,
    libpath: Option<String>,
}

impl DriverSpec {
    pub fn parse(spec: &str) -> std::result::Result<Self, RegistryError> {
        let mut parts = spec.splitn(3, ':');
        let engine = parts.next().unwrap_or_default().trim();
        let driver = parts.next().unwrap_or_default().trim();
        if engine.is_empty() || driver.is_empty() {
            return Err(RegistryError::InvalidSpec(spec.to_owned()));
        }
        Ok(Self {
            engine: engine.to_ascii_lowercase(),
            driver: driver.to_ascii_lowercase(),
            libpath: parts.next().filter(|p| !p.is_empty()).map(ToOwned::to_owned),
        })
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Path of a client library to load, if the driver needs one.
    pub fn libpath(&self) -> Option<&str> {
        self.libpath.as_deref()
    }
}

impl std::str::FromStr for DriverSpec {
    type Err = RegistryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for DriverSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.engine, self.driver)?;
        if let Some(libpath) = &self.libpath {
            write!(f, ":{libpath}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid driver specification {0:?}, expected <engine>:<driver>[:<libpath>]")]
    InvalidSpec(String),

    #[error("Unknown engine {0:?}")]
    UnknownEngine(String),

    #[error("Engine {engine:?} has no driver {driver:?}")]
    UnknownDriver { engine: String, driver: String },
}

pub type EngineFactory = Arc<dyn Fn(&DriverSpec) -> Result<Box<dyn Engine>> + Send + Sync>;

/// Engine factories by engine name.
#[derive(Clone)]
pub struct Registry {
    factories: BTreeMap<String, EngineFactory>,
}

impl Registry {
    /// A registry without any engine.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registers `factory` for `engine`, replacing any previous factory.
    pub fn register<F>(&mut self, engine: &str, factory: F)
    where
        F: Fn(&DriverSpec) -> Result<Box<dyn Engine>> + Send + Sync + 'static,
    {
        self.factories
            .insert(engine.to_ascii_lowercase(), Arc::new(factory));
    }

    pub fn engines(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn open(&self, spec: &DriverSpec) -> Result<Arc<dyn Engine>> {
        let factory = self
            .factories
            .get(spec.engine())
            .ok_or_else(|| RegistryError::UnknownEngine(spec.engine().to_owned()))?;
        log::debug!("Opening engine for {spec}");
        factory(spec).map(Arc::from)
    }
}

impl Default for Registry {
    /// A registry with the built-in engines.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(memory::ENGINE_NAME, |spec| {
            if spec.driver() != memory::DRIVER_NAME {
                return Err(Error::Registry(RegistryError::UnknownDriver {
                    engine: spec.engine().to_owned(),
                    driver: spec.driver().to_owned(),
                }));
            }
            Ok(Box::new(memory::MemoryEngine::new()))
        });
        registry
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}
