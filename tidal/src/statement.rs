use crate::{
    driver::StatementBackend,
    rows::Arena,
    Connection, Diagnostic, Diagnostics, Error, LogicError, ObjectKind, ResultSet, Result,
    SharedCell, Variant,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Unprepared,
    Prepared,
    Executed,
}

impl std::fmt::Display for StatementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unprepared => "unprepared",
            Self::Prepared => "prepared",
            Self::Executed => "executed",
        })
    }
}

/// A statement of a [`Connection`].
///
/// The statement moves from unprepared to prepared to executed; closing it
/// returns it to unprepared so that it can be prepared again.
pub struct Statement<'conn> {
    conn: &'conn Connection,
    backend: Box<dyn StatementBackend>,
    state: StatementState,
    sql: Option<String>,
    /// Parameter bindings, `None` while unbound.
    params: Vec<Option<Variant>>,
    arena: Arena,
    affected_rows: u64,
    diagnostics: Diagnostics,
}

impl<'conn> Statement<'conn> {
    pub(crate) fn new(conn: &'conn Connection, backend: Box<dyn StatementBackend>) -> Self {
        Self {
            conn,
            backend,
            state: StatementState::Unprepared,
            sql: None,
            params: Vec::new(),
            arena: Arena::default(),
            affected_rows: 0,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    /// Text of the prepared statement.
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    pub fn prepare(&mut self, sql: &str) -> Result<()> {
        self.ensure_state("prepare", &[StatementState::Unprepared])?;
        log::debug!("Preparing {sql:?}");
        let result = self.backend.prepare(sql);
        let count = self.check(result, Some(sql))?;
        self.params = vec![None; count];
        self.sql = Some(sql.to_owned());
        self.state = StatementState::Prepared;
        Ok(())
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Binds parameter `index` (1-based) to `value`.
    pub fn bind(&mut self, index: usize, value: impl Into<Variant>) -> Result<()> {
        *self.param_slot(index)? = Some(value.into());
        Ok(())
    }

    /// Binds parameter `index` (1-based) to a caller-owned cell. Every
    /// execution reads the cell's value at that time.
    pub fn bind_cell(&mut self, index: usize, cell: &SharedCell) -> Result<()> {
        self.bind(index, Variant::observe(cell))
    }

    pub fn param(&self, index: usize) -> Result<&Variant> {
        index
            .checked_sub(1)
            .and_then(|i| self.params.get(i))
            .ok_or_else(|| Error::NotFound(ObjectKind::Parameter, index.to_string()))?
            .as_ref()
            .ok_or_else(|| LogicError::UnboundParameter(index).into())
    }

    /// The variant bound to parameter `index`, binding NULL first if the
    /// parameter is unbound.
    pub fn param_mut(&mut self, index: usize) -> Result<&mut Variant> {
        Ok(self.param_slot(index)?.get_or_insert_with(Variant::new))
    }

    fn param_slot(&mut self, index: usize) -> Result<&mut Option<Variant>> {
        index
            .checked_sub(1)
            .and_then(|i| self.params.get_mut(i))
            .ok_or_else(|| Error::NotFound(ObjectKind::Parameter, index.to_string()))
    }

    /// Executes the prepared statement with the bound parameters.
    ///
    /// Executing again discards the rows of the previous execution.
    pub fn execute(&mut self) -> Result<()> {
        self.ensure_state(
            "execute",
            &[StatementState::Prepared, StatementState::Executed],
        )?;
        let mut params = Vec::with_capacity(self.params.len());
        for (i, param) in self.params.iter().enumerate() {
            let param = param.as_ref().ok_or(LogicError::UnboundParameter(i + 1))?;
            params.push(if param.is_null() {
                None
            } else {
                Some(param.value()?)
            });
        }
        self.state = StatementState::Prepared;
        log::debug!("Executing {:?}", self.sql.as_deref().unwrap_or_default());
        let result = self.backend.execute(&params);
        let execution = self.check(result, None)?;
        let result = self.arena.reset(self.backend.as_mut(), execution.columns);
        self.check(result, None)?;
        self.affected_rows = execution.affected_rows;
        self.state = StatementState::Executed;
        Ok(())
    }

    /// Closes the statement, then prepares and executes `sql`.
    pub fn execute_direct(&mut self, sql: &str) -> Result<()> {
        self.close();
        self.prepare(sql)?;
        self.execute()
    }

    /// The rows of the last execution.
    pub fn resultset(&mut self) -> Result<ResultSet<'_>> {
        self.ensure_state("read the results of", &[StatementState::Executed])?;
        Ok(ResultSet::new(
            self.backend.as_mut(),
            &mut self.arena,
            &mut self.diagnostics,
        ))
    }

    /// Rows changed, inserted, or deleted by the last execution.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Asks the engine to stop the running execution, if it can.
    pub fn cancel(&mut self) -> Result<()> {
        let result = self.backend.cancel();
        self.check(result, None)
    }

    /// Releases the prepared statement, its bindings and its row adapters.
    /// Closing an unprepared statement does nothing.
    pub fn close(&mut self) {
        if self.state == StatementState::Unprepared {
            return;
        }
        log::trace!("Closing statement");
        self.backend.close();
        self.arena.clear();
        self.params.clear();
        self.sql = None;
        self.affected_rows = 0;
        self.state = StatementState::Unprepared;
    }

    pub fn diag_avail(&self) -> bool {
        self.diagnostics.avail()
    }

    pub fn fetch_diag(&mut self) -> Option<Diagnostic> {
        self.diagnostics.fetch()
    }

    fn ensure_state(&self, operation: &'static str, allowed: &[StatementState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LogicError::InvalidState {
                operation,
                state: self.state,
            }
            .into())
        }
    }

    /// Drains backend diagnostics and records an engine error, attaching the
    /// statement text.
    fn check<T>(&mut self, result: Result<T>, sql: Option<&str>) -> Result<T> {
        self.diagnostics.extend(self.backend.take_diagnostics());
        result.map_err(|e| match e {
            Error::Engine(e) => {
                let sql = sql.or(self.sql.as_deref()).unwrap_or_default();
                let e = e.with_sql(sql);
                self.diagnostics.push(e.diagnostic().clone());
                Error::Engine(e)
            }
            e => e,
        })
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("state", &self.state)
            .field("sql", &self.sql)
            .field("params", &self.params)
            .field("columns", &self.arena.columns())
            .finish_non_exhaustive()
    }
}
