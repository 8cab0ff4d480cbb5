use crate::{
    driver::StatementBackend, Diagnostics, Error, LogicError, ObjectKind, Result, Type, Variant,
};

/// Describes one column of a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub datatype: Type,
    /// Maximum length in characters or bytes, for sized types.
    pub size: Option<usize>,
    pub nullable: bool,
    /// Fractional digits, for NUMERIC.
    pub scale: Option<u8>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, datatype: Type) -> Self {
        Self {
            name: name.into(),
            datatype,
            size: None,
            nullable: true,
            scale: None,
        }
    }

    /// Same name and type, which is what decides whether row adapters can be
    /// reused.
    fn same_layout(&self, other: &Self) -> bool {
        self.name == other.name && self.datatype == other.datatype
    }
}

/// Selects a column by position (0-based) or by name.
pub trait ColumnIndex {
    fn position(&self, columns: &[ColumnDescriptor]) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn position(&self, columns: &[ColumnDescriptor]) -> Result<usize> {
        if *self < columns.len() {
            Ok(*self)
        } else {
            Err(Error::NotFound(ObjectKind::Column, self.to_string()))
        }
    }
}

impl ColumnIndex for &str {
    fn position(&self, columns: &[ColumnDescriptor]) -> Result<usize> {
        columns
            .iter()
            .position(|column| column.name == *self)
            .or_else(|| {
                columns
                    .iter()
                    .position(|column| column.name.eq_ignore_ascii_case(self))
            })
            .ok_or_else(|| Error::NotFound(ObjectKind::Column, (*self).to_owned()))
    }
}

impl ColumnIndex for String {
    fn position(&self, columns: &[ColumnDescriptor]) -> Result<usize> {
        self.as_str().position(columns)
    }
}

/// Whether a row adapter reflects the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// No row has been fetched since the adapter was created.
    Unbound,
    /// The adapter reflects the current row.
    Bound,
    /// The cursor moved and the adapter has not been refreshed.
    Stale,
}

/// A row adapter: an observing variant for one result column.
pub(crate) struct Slot {
    variant: Variant,
    state: AdapterState,
}

/// Adapters for the columns of a statement's results.
///
/// The arena is reused across executions while the column layout stays the
/// same; it is dropped when the statement is closed.
#[derive(Default)]
pub(crate) struct Arena {
    columns: Vec<ColumnDescriptor>,
    slots: Vec<Slot>,
    row_number: u64,
    eof: bool,
}

impl Arena {
    /// Prepares the arena for a new execution returning `columns`.
    pub fn reset(
        &mut self,
        backend: &mut dyn StatementBackend,
        columns: Vec<ColumnDescriptor>,
    ) -> Result<()> {
        let reusable = self.columns.len() == columns.len()
            && self
                .columns
                .iter()
                .zip(&columns)
                .all(|(a, b)| a.same_layout(b));
        if reusable {
            for slot in &mut self.slots {
                slot.state = AdapterState::Unbound;
            }
        } else {
            self.slots.clear();
            for (i, column) in columns.iter().enumerate() {
                let cell = backend.cell(i)?;
                self.slots.push(Slot {
                    variant: Variant::from_cell(cell, Some(column.name.clone())),
                    state: AdapterState::Unbound,
                });
            }
        }
        self.columns = columns;
        self.row_number = 0;
        self.eof = false;
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }
}

/// Cursor over the rows of an executed statement.
///
/// Column values are observing variants that follow the cursor: after
/// [`ResultSet::next`] they show the new row. Use [`Variant::deepcopy`] or
/// [`ResultSet::row`] to keep a value.
pub struct ResultSet<'stmt> {
    backend: &'stmt mut dyn StatementBackend,
    arena: &'stmt mut Arena,
    diagnostics: &'stmt mut Diagnostics,
}

impl<'stmt> ResultSet<'stmt> {
    pub(crate) fn new(
        backend: &'stmt mut dyn StatementBackend,
        arena: &'stmt mut Arena,
        diagnostics: &'stmt mut Diagnostics,
    ) -> Self {
        Self {
            backend,
            arena,
            diagnostics,
        }
    }

    /// Advances to the next row. Returns `false` once the rows are exhausted.
    pub fn next(&mut self) -> Result<bool> {
        if self.arena.eof {
            return Ok(false);
        }
        for slot in &mut self.arena.slots {
            slot.state = AdapterState::Stale;
        }
        let fetched = self.backend.fetch();
        self.diagnostics.extend(self.backend.take_diagnostics());
        match fetched {
            Ok(true) => {
                for slot in &mut self.arena.slots {
                    slot.variant.refresh();
                    slot.state = AdapterState::Bound;
                }
                self.arena.row_number += 1;
                log::trace!("Fetched row {}", self.arena.row_number);
                Ok(true)
            }
            Ok(false) => {
                self.arena.eof = true;
                Ok(false)
            }
            Err(e) => {
                if let Some(diagnostic) = e.diagnostic() {
                    self.diagnostics.push(diagnostic.clone());
                }
                Err(e)
            }
        }
    }

    fn slot_position<I: ColumnIndex>(&self, index: I) -> Result<usize> {
        let i = index.position(&self.arena.columns)?;
        match self.arena.slots[i].state {
            AdapterState::Bound => Ok(i),
            AdapterState::Unbound | AdapterState::Stale => Err(LogicError::NoCurrentRow(i).into()),
        }
    }

    /// The value of a column in the current row.
    pub fn column<I: ColumnIndex>(&self, index: I) -> Result<&Variant> {
        let i = self.slot_position(index)?;
        Ok(&self.arena.slots[i].variant)
    }

    /// The value of a column in the current row, for writing through to the
    /// engine's row buffer.
    pub fn column_mut<I: ColumnIndex>(&mut self, index: I) -> Result<&mut Variant> {
        let i = self.slot_position(index)?;
        Ok(&mut self.arena.slots[i].variant)
    }

    pub fn column_state<I: ColumnIndex>(&self, index: I) -> Result<AdapterState> {
        let i = index.position(&self.arena.columns)?;
        Ok(self.arena.slots[i].state)
    }

    pub fn describe_column<I: ColumnIndex>(&self, index: I) -> Result<&ColumnDescriptor> {
        let i = index.position(&self.arena.columns)?;
        Ok(&self.arena.columns[i])
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.arena.columns
    }

    pub fn column_count(&self) -> usize {
        self.arena.columns.len()
    }

    /// 1-based number of the current row, 0 before the first row.
    pub fn row_number(&self) -> u64 {
        self.arena.row_number
    }

    pub fn is_eof(&self) -> bool {
        self.arena.eof
    }

    /// Owned copies of all values of the current row.
    pub fn row(&self) -> Result<Vec<Variant>> {
        (0..self.column_count())
            .map(|i| self.column(i).map(Variant::deepcopy))
            .collect()
    }
}

impl std::fmt::Debug for ResultSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.arena.columns)
            .field("row_number", &self.arena.row_number)
            .field("eof", &self.arena.eof)
            .finish_non_exhaustive()
    }
}
