use crate::{
    driver::{ConnectionBackend, Engine, Options, TransactionId},
    Diagnostic, Diagnostics, Error, LogicError, Result, Statement,
};
use std::{
    cell::{Cell, RefCell},
    sync::Arc,
};

pub struct Connection {
    engine: Arc<dyn Engine>,
    backend: RefCell<Option<Box<dyn ConnectionBackend>>>,
    diagnostics: RefCell<Diagnostics>,
}

impl Connection {
    pub(crate) fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            backend: RefCell::new(None),
            diagnostics: RefCell::default(),
        }
    }

    /// Opens the connection with `options` such as `database`, `username`
    /// and `password`.
    pub fn connect(&mut self, options: &Options) -> Result<()> {
        if self.is_connected() {
            return Err(LogicError::AlreadyConnected.into());
        }
        log::debug!("Connecting to {} engine", self.engine.name());
        let mut backend = match self.engine.connect(options) {
            Ok(backend) => backend,
            Err(e) => return Err(self.record(e)),
        };
        self.diagnostics
            .get_mut()
            .extend(backend.take_diagnostics());
        *self.backend.get_mut() = Some(backend);
        Ok(())
    }

    /// Closes the connection. Does nothing if it is not open.
    pub fn disconnect(&mut self) -> Result<()> {
        let Some(mut backend) = self.backend.get_mut().take() else {
            return Ok(());
        };
        log::debug!("Disconnecting from {} engine", self.engine.name());
        let result = backend.disconnect();
        self.diagnostics
            .get_mut()
            .extend(backend.take_diagnostics());
        result.map_err(|e| self.record(e))
    }

    pub fn is_connected(&self) -> bool {
        self.backend.borrow().is_some()
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn new_statement(&self) -> Result<Statement<'_>> {
        let backend = self.with_backend(|backend| backend.new_statement())?;
        Ok(Statement::new(self, backend))
    }

    /// Executes a single statement that returns no rows.
    ///
    /// On success, returns the number of rows that were changed, inserted,
    /// or deleted.
    pub fn execute(&self, sql: &str) -> Result<u64> {
        let mut statement = self.new_statement()?;
        statement.execute_direct(sql)?;
        Ok(statement.affected_rows())
    }

    /// Begins a transaction. Statements of this connection run in it until
    /// the returned handle is committed, rolled back or dropped.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let id = self.with_backend(|backend| backend.begin())?;
        log::debug!("Began transaction {id}");
        Ok(Transaction {
            conn: self,
            id,
            active: Cell::new(true),
        })
    }

    pub fn diag_avail(&self) -> bool {
        self.diagnostics.borrow().avail()
    }

    /// Removes and returns the oldest diagnostic record.
    pub fn fetch_diag(&self) -> Option<Diagnostic> {
        self.diagnostics.borrow_mut().fetch()
    }

    fn with_backend<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn ConnectionBackend) -> Result<T>,
    {
        let mut backend = self.backend.borrow_mut();
        let backend = backend.as_mut().ok_or(LogicError::NotConnected)?;
        let result = f(backend.as_mut());
        self.diagnostics
            .borrow_mut()
            .extend(backend.take_diagnostics());
        result.map_err(|e| self.record(e))
    }

    /// Keeps the diagnostic of an engine error on the connection.
    fn record(&self, e: Error) -> Error {
        if let Some(diagnostic) = e.diagnostic() {
            self.diagnostics.borrow_mut().push(diagnostic.clone());
        }
        e
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::warn!("Failed to disconnect: {e}");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("engine", &self.engine.name())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// An open transaction.
///
/// Dropping an active transaction rolls it back.
pub struct Transaction<'conn> {
    conn: &'conn Connection,
    id: TransactionId,
    active: Cell<bool>,
}

impl Transaction<'_> {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn commit(&self) -> Result<()> {
        self.ensure_active()?;
        self.conn.with_backend(|backend| backend.commit(self.id))?;
        log::debug!("Committed transaction {}", self.id);
        self.active.set(false);
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.ensure_active()?;
        self.conn.with_backend(|backend| backend.rollback(self.id))?;
        log::debug!("Rolled back transaction {}", self.id);
        self.active.set(false);
        Ok(())
    }

    pub fn savepoint(&self, name: &str) -> Result<()> {
        self.ensure_active()?;
        log::debug!("Savepoint {name:?} in transaction {}", self.id);
        self.conn
            .with_backend(|backend| backend.savepoint(self.id, name))
    }

    /// Undoes the changes made after savepoint `name`. The savepoint stays
    /// valid.
    pub fn rollback_to(&self, name: &str) -> Result<()> {
        self.ensure_active()?;
        log::debug!("Rolling back to savepoint {name:?} in transaction {}", self.id);
        self.conn
            .with_backend(|backend| backend.rollback_to(self.id, name))
    }

    fn ensure_active(&self) -> Result<()> {
        if self.active.get() {
            Ok(())
        } else {
            Err(TransactionError::Finished(self.id).into())
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.active.get() {
            return;
        }
        log::warn!("Transaction {} dropped while active, rolling back", self.id);
        if let Err(e) = self.rollback() {
            log::warn!("Failed to roll back transaction {}: {e}", self.id);
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("active", &self.active.get())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("Cannot begin a transaction within a transaction")]
    NestedTransaction,

    #[error("Transaction {0} has already been committed or rolled back")]
    Finished(TransactionId),

    #[error("Unknown transaction {0}")]
    UnknownTransaction(TransactionId),
}
