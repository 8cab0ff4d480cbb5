use super::store::{Store, Txn};
use crate::{ColumnDescriptor, Error, Result, Type, Value};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
enum EntryKind {
    Metadata,
    Table,
}

impl EntryKind {
    fn key(self, name: &str) -> Vec<u8> {
        let mut key = ObjectId::CATALOG.serialize();
        key.extend_from_slice(&(self as u64).to_be_bytes());
        key.extend_from_slice(name.as_bytes());
        key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct ObjectId(u64);

impl ObjectId {
    const CATALOG: Self = Self(0);

    pub fn serialize(self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct TableDef {
    pub id: ObjectId,
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|column| column.name == name)
            .ok_or_else(|| {
                Error::engine(
                    "42S22",
                    format!("Unknown column {name:?} in table {:?}", self.name),
                )
            })
    }

    pub fn row_key(&self, rowid: u64) -> Vec<u8> {
        let mut key = self.id.serialize();
        key.extend_from_slice(&rowid.to_be_bytes());
        key
    }

    pub fn row_prefix(&self) -> Vec<u8> {
        self.id.serialize()
    }

    /// Rowid following the last row of the table.
    pub fn next_rowid(&self, store: &Store) -> u64 {
        store
            .last_key(&self.row_prefix())
            .and_then(|key| key.get(8..16)?.try_into().ok())
            .map_or(1, |rowid| u64::from_be_bytes(rowid) + 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct ColumnDef {
    pub name: String,
    pub datatype: Type,
    /// Maximum length of CHAR and VARCHAR values, in characters.
    pub size: Option<usize>,
    /// Precision and scale of NUMERIC.
    pub precision: Option<u32>,
    pub scale: Option<u8>,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn describe(&self) -> ColumnDescriptor {
        ColumnDescriptor {
            name: self.name.clone(),
            datatype: self.datatype,
            size: self.size,
            nullable: self.nullable,
            scale: self.scale,
        }
    }
}

pub(super) type Row = Vec<Option<Value>>;

pub(super) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::engine("XX000", format!("Cannot encode: {e}")))
}

pub(super) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| Error::engine("XX001", format!("Corrupt database entry: {e}")))
}

fn entry<T: DeserializeOwned>(store: &Store, kind: EntryKind, name: &str) -> Result<Option<T>> {
    store
        .get(&kind.key(name))
        .map(|bytes| decode(&bytes))
        .transpose()
}

pub(super) fn table(store: &Store, name: &str) -> Result<TableDef> {
    entry(store, EntryKind::Table, name)?
        .ok_or_else(|| Error::engine("42S02", format!("Unknown table {name:?}")))
}

pub(super) fn table_exists(store: &Store, name: &str) -> bool {
    store.get(&EntryKind::Table.key(name)).is_some()
}

fn generate_object_id(txn: &mut Txn) -> Result<ObjectId> {
    const KEY: &str = "next_id";
    let next_id: u64 = entry(txn.store(), EntryKind::Metadata, KEY)?.unwrap_or(1);
    let _ = txn.insert(&EntryKind::Metadata.key(KEY), encode(&(next_id + 1))?);
    Ok(ObjectId(next_id))
}

pub(super) fn create_table(txn: &mut Txn, name: &str, columns: Vec<ColumnDef>) -> Result<()> {
    if table_exists(txn.store(), name) {
        return Err(Error::engine(
            "42S01",
            format!("Table {name:?} already exists"),
        ));
    }
    let def = TableDef {
        id: generate_object_id(txn)?,
        name: name.to_owned(),
        columns,
    };
    let _ = txn.insert(&EntryKind::Table.key(name), encode(&def)?);
    Ok(())
}

pub(super) fn drop_table(txn: &mut Txn, name: &str) -> Result<()> {
    let def = table(txn.store(), name)?;
    for (key, _) in txn.store().scan_prefix(&def.row_prefix()) {
        txn.remove(&key);
    }
    txn.remove(&EntryKind::Table.key(name));
    Ok(())
}
