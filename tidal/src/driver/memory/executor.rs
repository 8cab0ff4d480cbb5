use super::{
    catalog::{self, ColumnDef, Row, TableDef},
    cell::Field,
    command::{Command, Condition, Operand, Projection},
    store::{Store, Txn},
    Session,
};
use crate::{convert, ConvertError, ConvertFailure, Error, Result, Value};
use std::{
    collections::{HashSet, VecDeque},
    rc::Rc,
};

#[derive(Default)]
pub(super) struct Outcome {
    pub affected_rows: u64,
    pub columns: Vec<ColumnDef>,
    pub rows: VecDeque<Vec<Field>>,
}

impl Outcome {
    fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Default::default()
        }
    }
}

pub(super) fn execute(
    session: &mut Session,
    command: &Command,
    params: &[Option<Value>],
) -> Result<Outcome> {
    match command {
        Command::Select {
            table,
            projection,
            filter,
        } => select(session.store(), table, projection, filter, params),
        Command::CreateTable {
            name,
            if_not_exists,
            columns,
        } => {
            let mut seen = HashSet::new();
            if let Some(column) = columns.iter().find(|c| !seen.insert(c.name.as_str())) {
                return Err(Error::engine(
                    "42S21",
                    format!("Duplicate column {:?}", column.name),
                ));
            }
            session
                .write(|txn| {
                    if *if_not_exists && catalog::table_exists(txn.store(), name) {
                        return Ok(0);
                    }
                    catalog::create_table(txn, name, columns.clone())?;
                    Ok(0)
                })
                .map(Outcome::affected)
        }
        Command::DropTable { name, if_exists } => {
            if *if_exists && !catalog::table_exists(session.store(), name) {
                return Ok(Outcome::default());
            }
            session
                .write(|txn| catalog::drop_table(txn, name).map(|()| 0))
                .map(Outcome::affected)
        }
        Command::Insert {
            table,
            columns,
            rows,
        } => session
            .write(|txn| insert(txn, table, columns.as_deref(), rows, params))
            .map(Outcome::affected),
        Command::Update {
            table,
            sets,
            filter,
        } => session
            .write(|txn| update(txn, table, sets, filter, params))
            .map(Outcome::affected),
        Command::Delete { table, filter } => session
            .write(|txn| delete(txn, table, filter, params))
            .map(Outcome::affected),
    }
}

fn select(
    store: &Store,
    table: &str,
    projection: &Projection,
    filter: &[Condition],
    params: &[Option<Value>],
) -> Result<Outcome> {
    let def = catalog::table(store, table)?;
    let indices = match projection {
        Projection::All => (0..def.columns.len()).collect(),
        Projection::Columns(names) => names
            .iter()
            .map(|name| def.column(name))
            .collect::<Result<Vec<_>>>()?,
    };
    let filter = Filter::new(&def, filter, params)?;
    let mut rows = VecDeque::new();
    for (_, bytes) in store.scan_prefix(&def.row_prefix()) {
        let row: Row = catalog::decode(&bytes)?;
        if !filter.matches(&row) {
            continue;
        }
        let encoded: Rc<[u8]> = bytes.into();
        let fields = indices
            .iter()
            .map(|&i| {
                let value = row.get(i).cloned().flatten();
                if def.columns[i].datatype.is_lob() {
                    Field::Lob {
                        row: encoded.clone(),
                        column: i,
                        null: value.is_none(),
                    }
                } else {
                    Field::inline(value)
                }
            })
            .collect();
        rows.push_back(fields);
    }
    log::trace!("Selected {} rows from {table:?}", rows.len());
    Ok(Outcome {
        affected_rows: 0,
        columns: indices.iter().map(|&i| def.columns[i].clone()).collect(),
        rows,
    })
}

fn insert(
    txn: &mut Txn,
    table: &str,
    columns: Option<&[String]>,
    rows: &[Vec<Operand>],
    params: &[Option<Value>],
) -> Result<u64> {
    let def = catalog::table(txn.store(), table)?;
    let targets = match columns {
        Some(names) => names
            .iter()
            .map(|name| def.column(name))
            .collect::<Result<Vec<_>>>()?,
        None => (0..def.columns.len()).collect(),
    };
    let mut rowid = def.next_rowid(txn.store());
    for operands in rows {
        if operands.len() != targets.len() {
            return Err(Error::engine(
                "21S01",
                format!(
                    "Expected {} values, got {}",
                    targets.len(),
                    operands.len()
                ),
            ));
        }
        let mut values: Row = vec![None; def.columns.len()];
        for (&i, operand) in targets.iter().zip(operands) {
            values[i] = operand.resolve(params);
        }
        let row = def
            .columns
            .iter()
            .zip(values)
            .map(|(column, value)| coerce(column, value))
            .collect::<Result<Row>>()?;
        let _ = txn.insert(&def.row_key(rowid), catalog::encode(&row)?);
        rowid += 1;
    }
    Ok(rows.len() as u64)
}

fn update(
    txn: &mut Txn,
    table: &str,
    sets: &[(String, Operand)],
    filter: &[Condition],
    params: &[Option<Value>],
) -> Result<u64> {
    let def = catalog::table(txn.store(), table)?;
    let mut assignments = Vec::with_capacity(sets.len());
    for (name, operand) in sets {
        let i = def.column(name)?;
        assignments.push((i, coerce(&def.columns[i], operand.resolve(params))?));
    }
    let filter = Filter::new(&def, filter, params)?;
    let mut count = 0;
    for (key, bytes) in txn.store().scan_prefix(&def.row_prefix()) {
        let mut row: Row = catalog::decode(&bytes)?;
        if !filter.matches(&row) {
            continue;
        }
        for (i, value) in &assignments {
            row[*i].clone_from(value);
        }
        let _ = txn.insert(&key, catalog::encode(&row)?);
        count += 1;
    }
    Ok(count)
}

fn delete(
    txn: &mut Txn,
    table: &str,
    filter: &[Condition],
    params: &[Option<Value>],
) -> Result<u64> {
    let def = catalog::table(txn.store(), table)?;
    let filter = Filter::new(&def, filter, params)?;
    let mut count = 0;
    for (key, bytes) in txn.store().scan_prefix(&def.row_prefix()) {
        let row: Row = catalog::decode(&bytes)?;
        if filter.matches(&row) {
            txn.remove(&key);
            count += 1;
        }
    }
    Ok(count)
}

/// Converts a value to the type of the column it is stored in.
fn coerce(column: &ColumnDef, value: Option<Value>) -> Result<Option<Value>> {
    let Some(value) = value else {
        if !column.nullable {
            return Err(Error::engine(
                "23502",
                format!("Column {:?} cannot be NULL", column.name),
            ));
        }
        return Ok(None);
    };
    let value = convert::convert(&value, column.datatype)
        .map_err(|e| conversion_error(column, e))?;
    match value {
        Value::Text(s) if column.size.is_some_and(|size| s.chars().count() > size) => {
            Err(Error::engine(
                "22001",
                format!(
                    "Value {s:?} is too long for column {:?} of type {}({})",
                    column.name,
                    column.datatype,
                    column.size.unwrap_or_default()
                ),
            ))
        }
        Value::Numeric(n) => {
            let fits = column
                .scale
                .map_or(Some(n), |scale| n.rescale(scale))
                .filter(|n| column.precision.map_or(true, |p| n.precision() <= p));
            match fits {
                Some(n) => Ok(Some(Value::Numeric(n))),
                None => Err(Error::engine(
                    "22003",
                    format!(
                        "Value {n} does not fit column {:?} of type NUMERIC({}, {})",
                        column.name,
                        column.precision.unwrap_or_default(),
                        column.scale.unwrap_or_default()
                    ),
                )),
            }
        }
        value => Ok(Some(value)),
    }
}

fn conversion_error(column: &ColumnDef, e: ConvertError) -> Error {
    let sqlstate = match e.reason() {
        ConvertFailure::OutOfRange | ConvertFailure::Inexact => "22003",
        ConvertFailure::Unsupported | ConvertFailure::Invalid(_) => "22018",
    };
    Error::engine(sqlstate, e.with_column(Some(&column.name)).to_string())
}

enum Predicate {
    /// `None` never matches, as comparing with NULL is unknown.
    Eq(Option<Value>),
    IsNull,
    IsNotNull,
}

/// A WHERE clause resolved against a table.
struct Filter(Vec<(usize, Predicate)>);

impl Filter {
    fn new(def: &TableDef, conditions: &[Condition], params: &[Option<Value>]) -> Result<Self> {
        let mut predicates = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let predicate = match condition {
                Condition::Eq(name, operand) => {
                    let i = def.column(name)?;
                    (i, Predicate::Eq(comparable(&def.columns[i], operand.resolve(params))?))
                }
                Condition::IsNull(name) => (def.column(name)?, Predicate::IsNull),
                Condition::IsNotNull(name) => (def.column(name)?, Predicate::IsNotNull),
            };
            predicates.push(predicate);
        }
        Ok(Self(predicates))
    }

    fn matches(&self, row: &Row) -> bool {
        self.0.iter().all(|(i, predicate)| {
            let value = row.get(*i).and_then(Option::as_ref);
            match predicate {
                Predicate::Eq(operand) => operand.is_some() && value == operand.as_ref(),
                Predicate::IsNull => value.is_none(),
                Predicate::IsNotNull => value.is_some(),
            }
        })
    }
}

/// Converts a comparison operand to the column's representation. Operands
/// that cannot be represented in the column compare unequal.
fn comparable(column: &ColumnDef, operand: Option<Value>) -> Result<Option<Value>> {
    let Some(operand) = operand else {
        return Ok(None);
    };
    let value = match convert::convert(&operand, column.datatype) {
        Ok(value) => value,
        Err(e) if matches!(e.reason(), ConvertFailure::OutOfRange | ConvertFailure::Inexact) => {
            return Ok(None);
        }
        Err(e) => return Err(conversion_error(column, e)),
    };
    Ok(match (value, column.scale) {
        (Value::Numeric(n), Some(scale)) => n.rescale(scale).map(Value::Numeric),
        (value, _) => Some(value),
    })
}
