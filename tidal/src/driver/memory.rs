//! The built-in `memory` engine.
//!
//! Databases are ordered key-value maps holding a catalog and table rows. The
//! database named `:memory:` is private to its connection; any other name is
//! a file path whose database is shared by every connection of the engine and
//! written back to the file on commit.

mod catalog;
mod cell;
mod command;
mod executor;
mod store;

use super::{ConnectionBackend, Engine, Execution, Options, StatementBackend, TransactionId};
use crate::{
    cell::BackendCell, Diagnostic, Error, LogicError, ObjectKind, Result, StatementState,
    TransactionError, Value,
};
use catalog::ColumnDef;
use cell::{Field, InlineCell, LobCell, SharedBuffer};
use command::{Command, CommandError, Parser};
use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    path::Path,
    rc::Rc,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};
use store::{Store, Txn, UndoLog};

pub const ENGINE_NAME: &str = "memory";
pub const DRIVER_NAME: &str = "default";

/// Name of the database that lives only as long as its connection.
pub const MEMORY_DATABASE: &str = ":memory:";

pub struct MemoryEngine {
    databases: Mutex<HashMap<String, Arc<Store>>>,
    next_connection: AtomicU64,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            databases: Mutex::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
        }
    }

    fn open_store(&self, database: &str, create: bool) -> Result<Arc<Store>> {
        let mut databases = self
            .databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = databases.get(database) {
            return Ok(store.clone());
        }
        let store = Arc::new(Store::open(Path::new(database), create)?);
        databases.insert(database.to_owned(), store.clone());
        Ok(store)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MemoryEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn connect(&self, options: &Options) -> Result<Box<dyn ConnectionBackend>> {
        let mut diagnostics = Vec::new();
        let mut database = None;
        let mut create = true;
        for (key, value) in options {
            match key.to_ascii_lowercase().as_str() {
                "database" => database = Some(value.as_string()?),
                "create" => create = value.as_bool()?,
                "username" | "password" => {}
                _ => {
                    log::warn!("Ignoring unknown connect option {key:?}");
                    diagnostics.push(Diagnostic::info(
                        "01S00",
                        format!("Option {key:?} is not used by the {ENGINE_NAME} engine"),
                    ));
                }
            }
        }
        let database =
            database.ok_or_else(|| Error::engine("08001", "No database given to connect to"))?;
        let store = if database == MEMORY_DATABASE {
            Arc::new(Store::in_memory(&database))
        } else {
            self.open_store(&database, create)?
        };
        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        log::debug!("Connection {id} opened database {}", store.name());
        Ok(Box::new(MemoryConnection {
            session: Rc::new(RefCell::new(Session::new(id, store))),
            diagnostics,
        }))
    }
}

struct OpenTransaction {
    id: TransactionId,
    undo: UndoLog,
    /// Savepoint names and the undo log length when they were set.
    savepoints: Vec<(String, usize)>,
}

/// State of one connection, shared with its statements.
struct Session {
    id: u64,
    store: Arc<Store>,
    txn: Option<OpenTransaction>,
    last_txn: TransactionId,
}

impl Session {
    fn new(id: u64, store: Arc<Store>) -> Self {
        Self {
            id,
            store,
            txn: None,
            last_txn: 0,
        }
    }

    fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Runs a write. Outside a transaction the write commits on success.
    /// Inside one, a failed write undoes only its own changes.
    fn write(&mut self, f: impl FnOnce(&mut Txn) -> Result<u64>) -> Result<u64> {
        self.store.lock_writer(self.id)?;
        if let Some(open) = &mut self.txn {
            let mark = open.undo.len();
            let result = f(&mut Txn::new(&self.store, &mut open.undo));
            if result.is_err() {
                open.undo.rollback_to(&self.store, mark);
            }
            return result;
        }

        let mut undo = UndoLog::default();
        let result = f(&mut Txn::new(&self.store, &mut undo));
        let result = result.and_then(|n| {
            if !undo.is_empty() {
                self.store.persist()?;
            }
            Ok(n)
        });
        if result.is_err() {
            undo.rollback(&self.store);
        }
        self.store.unlock_writer(self.id);
        result
    }

    fn begin(&mut self) -> Result<TransactionId> {
        if self.txn.is_some() {
            return Err(TransactionError::NestedTransaction.into());
        }
        self.last_txn += 1;
        self.txn = Some(OpenTransaction {
            id: self.last_txn,
            undo: UndoLog::default(),
            savepoints: Vec::new(),
        });
        log::trace!("Connection {} began transaction {}", self.id, self.last_txn);
        Ok(self.last_txn)
    }

    fn take_txn(&mut self, id: TransactionId) -> Result<OpenTransaction> {
        match self.txn.take() {
            Some(open) if open.id == id => Ok(open),
            other => {
                self.txn = other;
                Err(TransactionError::UnknownTransaction(id).into())
            }
        }
    }

    fn open_txn(&mut self, id: TransactionId) -> Result<&mut OpenTransaction> {
        match &mut self.txn {
            Some(open) if open.id == id => Ok(open),
            _ => Err(TransactionError::UnknownTransaction(id).into()),
        }
    }

    fn commit(&mut self, id: TransactionId) -> Result<()> {
        let open = self.take_txn(id)?;
        if !open.undo.is_empty() {
            if let Err(e) = self.store.persist() {
                self.txn = Some(open);
                return Err(e);
            }
        }
        self.store.unlock_writer(self.id);
        log::trace!("Connection {} committed transaction {id}", self.id);
        Ok(())
    }

    fn rollback(&mut self, id: TransactionId) -> Result<()> {
        let mut open = self.take_txn(id)?;
        open.undo.rollback(&self.store);
        self.store.unlock_writer(self.id);
        log::trace!("Connection {} rolled back transaction {id}", self.id);
        Ok(())
    }

    fn savepoint(&mut self, id: TransactionId, name: &str) -> Result<()> {
        let open = self.open_txn(id)?;
        let mark = open.undo.len();
        open.savepoints.push((name.to_owned(), mark));
        Ok(())
    }

    fn rollback_to(&mut self, id: TransactionId, name: &str) -> Result<()> {
        let store = self.store.clone();
        let open = self.open_txn(id)?;
        let position = open
            .savepoints
            .iter()
            .rposition(|(savepoint, _)| savepoint == name)
            .ok_or_else(|| Error::NotFound(ObjectKind::Savepoint, name.to_owned()))?;
        let mark = open.savepoints[position].1;
        open.undo.rollback_to(&store, mark);
        open.savepoints.truncate(position + 1);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut open) = self.txn.take() {
            log::warn!(
                "Rolling back transaction {} of connection {} on disconnect",
                open.id,
                self.id
            );
            open.undo.rollback(&self.store);
        }
        self.store.unlock_writer(self.id);
    }
}

struct MemoryConnection {
    session: Rc<RefCell<Session>>,
    diagnostics: Vec<Diagnostic>,
}

impl ConnectionBackend for MemoryConnection {
    fn new_statement(&mut self) -> Result<Box<dyn StatementBackend>> {
        Ok(Box::new(MemoryStatement::new(self.session.clone())))
    }

    fn begin(&mut self) -> Result<TransactionId> {
        self.session.borrow_mut().begin()
    }

    fn commit(&mut self, txn: TransactionId) -> Result<()> {
        self.session.borrow_mut().commit(txn)
    }

    fn rollback(&mut self, txn: TransactionId) -> Result<()> {
        self.session.borrow_mut().rollback(txn)
    }

    fn savepoint(&mut self, txn: TransactionId, name: &str) -> Result<()> {
        self.session.borrow_mut().savepoint(txn, name)
    }

    fn rollback_to(&mut self, txn: TransactionId, name: &str) -> Result<()> {
        self.session.borrow_mut().rollback_to(txn, name)
    }

    fn disconnect(&mut self) -> Result<()> {
        self.session.borrow_mut().close();
        Ok(())
    }

    fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

struct MemoryStatement {
    session: Rc<RefCell<Session>>,
    prepared: Option<(Command, usize)>,
    columns: Vec<ColumnDef>,
    rows: VecDeque<Vec<Field>>,
    buffer: SharedBuffer,
}

impl MemoryStatement {
    fn new(session: Rc<RefCell<Session>>) -> Self {
        Self {
            session,
            prepared: None,
            columns: Vec::new(),
            rows: VecDeque::new(),
            buffer: SharedBuffer::default(),
        }
    }
}

impl StatementBackend for MemoryStatement {
    fn prepare(&mut self, sql: &str) -> Result<usize> {
        let (command, param_count) = Parser::new(sql).parse().map_err(|e| match e {
            CommandError::MultipleStatements => LogicError::MultipleStatements.into(),
            e => Error::engine(e.sqlstate(), e.to_string()),
        })?;
        log::trace!("Prepared {command:?} with {param_count} parameters");
        self.prepared = Some((command, param_count));
        Ok(param_count)
    }

    fn execute(&mut self, params: &[Option<Value>]) -> Result<Execution> {
        let Some((command, param_count)) = &self.prepared else {
            return Err(LogicError::InvalidState {
                operation: "execute",
                state: StatementState::Unprepared,
            }
            .into());
        };
        if params.len() != *param_count {
            return Err(Error::engine(
                "07001",
                format!("Expected {param_count} parameters, got {}", params.len()),
            ));
        }
        self.rows.clear();
        self.buffer.borrow_mut().clear();
        let outcome = executor::execute(&mut self.session.borrow_mut(), command, params)?;
        self.columns = outcome.columns;
        self.rows = outcome.rows;
        Ok(Execution {
            affected_rows: outcome.affected_rows,
            columns: self.columns.iter().map(ColumnDef::describe).collect(),
        })
    }

    fn cell(&mut self, column: usize) -> Result<Box<dyn BackendCell>> {
        let def = self
            .columns
            .get(column)
            .ok_or_else(|| Error::NotFound(ObjectKind::Column, column.to_string()))?;
        if def.datatype.is_lob() {
            Ok(Box::new(LobCell::new(
                self.buffer.clone(),
                column,
                def.datatype,
            )))
        } else {
            Ok(Box::new(InlineCell::new(
                self.buffer.clone(),
                column,
                def.datatype,
            )))
        }
    }

    fn fetch(&mut self) -> Result<bool> {
        let mut buffer = self.buffer.borrow_mut();
        match self.rows.pop_front() {
            Some(fields) => {
                buffer.load(fields);
                Ok(true)
            }
            None => {
                buffer.clear();
                Ok(false)
            }
        }
    }

    fn close(&mut self) {
        self.prepared = None;
        self.columns.clear();
        self.rows.clear();
        self.buffer.borrow_mut().clear();
    }

    fn cancel(&mut self) -> Result<()> {
        log::debug!("Discarding {} pending rows", self.rows.len());
        self.rows.clear();
        Ok(())
    }
}
