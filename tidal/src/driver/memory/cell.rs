use super::catalog::{self, Row};
use crate::{
    cell::BackendCell, convert, BlobStream, Error, MemoStream, Result, Type, Value,
};
use std::{cell::OnceCell, cell::RefCell, rc::Rc};

/// One column of a fetched row.
#[derive(Debug, Clone)]
pub(super) enum Field {
    Inline {
        value: Option<Value>,
        null: bool,
    },
    /// A large object, decoded from the row as it was read when first
    /// accessed.
    Lob {
        row: Rc<[u8]>,
        column: usize,
        null: bool,
    },
}

impl Field {
    pub fn inline(value: Option<Value>) -> Self {
        Self::Inline {
            null: value.is_none(),
            value,
        }
    }
}

/// The current row of a statement, shared by the statement's cells.
#[derive(Debug, Default)]
pub(super) struct FetchBuffer {
    fields: Vec<Field>,
}

impl FetchBuffer {
    pub fn load(&mut self, fields: Vec<Field>) {
        self.fields = fields;
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

pub(super) type SharedBuffer = Rc<RefCell<FetchBuffer>>;

/// A column whose value is held in the fetch buffer.
pub(super) struct InlineCell {
    buffer: SharedBuffer,
    column: usize,
    datatype: Type,
}

impl InlineCell {
    pub fn new(buffer: SharedBuffer, column: usize, datatype: Type) -> Self {
        Self {
            buffer,
            column,
            datatype,
        }
    }

    fn with_field<T>(&self, f: impl FnOnce(Option<&mut Field>) -> T) -> T {
        f(self.buffer.borrow_mut().fields.get_mut(self.column))
    }
}

impl BackendCell for InlineCell {
    fn datatype(&self) -> Type {
        self.datatype
    }

    fn is_null(&self) -> bool {
        self.with_field(|field| match field {
            Some(Field::Inline { value, null }) => *null || value.is_none(),
            Some(Field::Lob { null, .. }) => *null,
            None => true,
        })
    }

    fn value(&self) -> Result<Option<Value>> {
        Ok(self.with_field(|field| match field {
            Some(Field::Inline { value, .. }) => value.clone(),
            _ => None,
        }))
    }

    fn write(&mut self, new_value: Option<Value>) -> Result<()> {
        let new_value = new_value
            .map(|value| convert::convert(&value, self.datatype))
            .transpose()?;
        self.with_field(|field| {
            if let Some(Field::Inline { value, null }) = field {
                *null = new_value.is_none();
                if new_value.is_some() {
                    *value = new_value;
                }
            }
        });
        Ok(())
    }

    fn set_null(&mut self, is_null: bool) -> Result<()> {
        self.with_field(|field| {
            if let Some(Field::Inline { null, .. }) = field {
                *null = is_null;
            }
        });
        Ok(())
    }
}

/// A BLOB or MEMO column. The object is decoded on first access and dropped
/// when the cursor moves. Later changes to the stored row are not seen.
pub(super) struct LobCell {
    buffer: SharedBuffer,
    column: usize,
    datatype: Type,
    cache: OnceCell<Option<Value>>,
}

impl LobCell {
    pub fn new(buffer: SharedBuffer, column: usize, datatype: Type) -> Self {
        Self {
            buffer,
            column,
            datatype,
            cache: OnceCell::new(),
        }
    }

    fn load(&self) -> Result<Option<Value>> {
        let (row, column) = match self.buffer.borrow().fields.get(self.column) {
            Some(Field::Lob {
                row,
                column,
                null: false,
            }) => (row.clone(), *column),
            Some(Field::Inline { value, .. }) => return Ok(value.clone()),
            Some(Field::Lob { null: true, .. }) | None => return Ok(None),
        };
        log::trace!("Decoding large object from column {column}");
        let mut row: Row = catalog::decode(&row)?;
        match row.get_mut(column) {
            Some(value) => Ok(value.take()),
            None => Err(Error::engine(
                "XX001",
                format!("Stored row has no column {column}"),
            )),
        }
    }

    fn loaded(&self) -> Result<Option<&Value>> {
        if self.cache.get().is_none() {
            let value = self.load()?;
            let _ = self.cache.set(value);
        }
        Ok(self.cache.get().and_then(Option::as_ref))
    }

    fn object(&self) -> Result<&Value> {
        self.loaded()?.ok_or(Error::NullValue { column: None })
    }
}

impl BackendCell for LobCell {
    fn datatype(&self) -> Type {
        self.datatype
    }

    fn is_null(&self) -> bool {
        match self.buffer.borrow().fields.get(self.column) {
            Some(Field::Lob { null, .. }) => *null,
            Some(Field::Inline { value, null }) => *null || value.is_none(),
            None => true,
        }
    }

    fn value(&self) -> Result<Option<Value>> {
        Ok(self.loaded()?.cloned())
    }

    fn blob(&self) -> Result<BlobStream<'_>> {
        match self.object()? {
            Value::Blob(bytes) => Ok(BlobStream::new(bytes.as_slice())),
            value => Ok(BlobStream::new(convert::extract::<Vec<u8>>(value)?)),
        }
    }

    fn memo(&self) -> Result<MemoStream<'_>> {
        match self.object()? {
            Value::Memo(text) | Value::Text(text) => Ok(MemoStream::new(text.as_str())),
            value => Err(convert::unsupported(value.datatype(), Type::Memo).into()),
        }
    }

    fn refresh(&mut self) {
        self.cache.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn lob_over(row: &[u8], column: usize) -> LobCell {
        let buffer = SharedBuffer::default();
        buffer.borrow_mut().load(vec![Field::Lob {
            row: row.into(),
            column,
            null: false,
        }]);
        LobCell::new(buffer, 0, Type::Blob)
    }

    #[test]
    fn decodes_the_fetched_row() {
        let row = catalog::encode(&vec![None, Some(Value::Blob(vec![1, 2]))]).unwrap();
        let cell = lob_over(&row, 1);
        assert!(!cell.is_null());
        assert_eq!(cell.value().unwrap(), Some(Value::Blob(vec![1, 2])));
    }

    #[test]
    fn undecodable_row_is_an_engine_error() {
        let cell = lob_over(&[0xff], 0);
        let err = cell.value().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert_eq!(err.sqlstate(), Some("XX001"));
        assert!(matches!(cell.blob(), Err(e) if e.kind() == ErrorKind::Engine));
    }

    #[test]
    fn missing_column_is_an_engine_error() {
        let row = catalog::encode(&vec![Some(Value::Int32(1))]).unwrap();
        let err = lob_over(&row, 3).value().unwrap_err();
        assert_eq!(err.sqlstate(), Some("XX001"));
    }
}
