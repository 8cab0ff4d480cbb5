use crate::{
    cell::{BackendCell, SharedCell},
    convert::{self, extract},
    BlobStream, Date, Error, FromValue, Interval, MemoStream, Numeric, Result, Time, Timestamp,
    Type, Value,
};
use std::borrow::Cow;

/// A container for any SQL value, or NULL.
///
/// A variant either owns its value or observes a [`BackendCell`] living in
/// engine memory. Observing variants read and write through to the cell; the
/// values of result columns are observing variants owned by the result set.
///
/// Reads never coerce silently. A typed read succeeds only for the held type
/// itself or a target declared in [`conversions`](crate::conversions), and
/// reading NULL is an error.
pub struct Variant {
    name: Option<String>,
    storage: Storage,
}

enum Storage {
    Owned {
        value: Option<Value>,
        null: bool,
        datatype: Type,
    },
    Observing(Box<dyn BackendCell>),
}

impl Variant {
    /// A NULL variant of unknown type.
    pub fn new() -> Self {
        Self::null_of(Type::Unknown)
    }

    /// A NULL variant that remembers its type.
    pub fn null_of(datatype: Type) -> Self {
        Self {
            name: None,
            storage: Storage::Owned {
                value: None,
                null: true,
                datatype,
            },
        }
    }

    pub fn named(value: impl Into<Self>, name: impl Into<String>) -> Self {
        let mut variant = value.into();
        variant.name = Some(name.into());
        variant
    }

    /// A MEMO (character large object) value.
    pub fn memo(text: impl Into<String>) -> Self {
        Value::Memo(text.into()).into()
    }

    /// A variant that reads and writes through to `cell`.
    pub fn observe(cell: &SharedCell) -> Self {
        Self::from_cell(Box::new(cell.clone()), None)
    }

    pub fn from_cell(cell: Box<dyn BackendCell>, name: Option<String>) -> Self {
        Self {
            name,
            storage: Storage::Observing(cell),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn is_observing(&self) -> bool {
        matches!(self.storage, Storage::Observing(_))
    }

    pub fn is_null(&self) -> bool {
        match &self.storage {
            Storage::Owned { value, null, .. } => *null || value.is_none(),
            Storage::Observing(cell) => cell.is_null(),
        }
    }

    /// Sets or clears the null flag. The payload is kept, but reads fail
    /// while the flag is set.
    pub fn set_null(&mut self, is_null: bool) -> Result<()> {
        match &mut self.storage {
            Storage::Owned { null, .. } => {
                *null = is_null;
                Ok(())
            }
            Storage::Observing(cell) => cell
                .set_null(is_null)
                .map_err(|e| e.in_column(self.name.as_deref())),
        }
    }

    pub fn datatype(&self) -> Type {
        match &self.storage {
            Storage::Owned { datatype, .. } => *datatype,
            Storage::Observing(cell) => cell.datatype(),
        }
    }

    fn payload(&self) -> Result<Option<Cow<'_, Value>>> {
        match &self.storage {
            Storage::Owned { value, .. } => Ok(value.as_ref().map(Cow::Borrowed)),
            Storage::Observing(cell) => cell
                .value()
                .map(|value| value.map(Cow::Owned))
                .map_err(|e| e.in_column(self.name.as_deref())),
        }
    }

    fn held(&self) -> Result<Cow<'_, Value>> {
        if self.is_null() {
            return Err(self.null_error());
        }
        self.payload()?.ok_or_else(|| self.null_error())
    }

    fn null_error(&self) -> Error {
        Error::NullValue {
            column: self.name.clone(),
        }
    }

    /// The held value, unconverted.
    pub fn value(&self) -> Result<Value> {
        self.held().map(Cow::into_owned)
    }

    /// Reads the value as `T`, converting along a declared conversion.
    pub fn get<T: FromValue>(&self) -> Result<T> {
        let value = self.held()?;
        extract(&value).map_err(|e| e.with_column(self.name()).into())
    }

    /// Like [`Variant::get`], but NULL reads as `None`.
    pub fn get_opt<T: FromValue>(&self) -> Result<Option<T>> {
        if self.is_null() {
            return Ok(None);
        }
        self.get().map(Some)
    }

    pub fn as_i8(&self) -> Result<i8> {
        self.get()
    }

    pub fn as_u8(&self) -> Result<u8> {
        self.get()
    }

    pub fn as_i16(&self) -> Result<i16> {
        self.get()
    }

    pub fn as_u16(&self) -> Result<u16> {
        self.get()
    }

    pub fn as_i32(&self) -> Result<i32> {
        self.get()
    }

    pub fn as_u32(&self) -> Result<u32> {
        self.get()
    }

    pub fn as_i64(&self) -> Result<i64> {
        self.get()
    }

    pub fn as_u64(&self) -> Result<u64> {
        self.get()
    }

    /// Reads the value as an INTEGER.
    pub fn as_int(&self) -> Result<i32> {
        self.get()
    }

    /// Reads the value as a BIGINT.
    pub fn as_bigint(&self) -> Result<i64> {
        self.get()
    }

    pub fn as_bool(&self) -> Result<bool> {
        self.get()
    }

    pub fn as_f32(&self) -> Result<f32> {
        self.get()
    }

    pub fn as_f64(&self) -> Result<f64> {
        self.get()
    }

    pub fn as_string(&self) -> Result<String> {
        self.get()
    }

    pub fn as_numeric(&self) -> Result<Numeric> {
        self.get()
    }

    pub fn as_date(&self) -> Result<Date> {
        self.get()
    }

    pub fn as_time(&self) -> Result<Time> {
        self.get()
    }

    pub fn as_timestamp(&self) -> Result<Timestamp> {
        self.get()
    }

    pub fn as_interval(&self) -> Result<Interval> {
        self.get()
    }

    pub fn as_bytes(&self) -> Result<Vec<u8>> {
        self.get()
    }

    /// Opens a byte stream over the value.
    ///
    /// The stream borrows the variant; it cannot outlive a refresh of the row.
    pub fn as_blob(&self) -> Result<BlobStream<'_>> {
        if self.is_null() {
            return Err(self.null_error());
        }
        let stream = match &self.storage {
            Storage::Owned {
                value: Some(Value::Blob(bytes)),
                ..
            } => Ok(BlobStream::new(bytes.as_slice())),
            Storage::Owned { .. } => self.get::<Vec<u8>>().map(BlobStream::new),
            Storage::Observing(cell) => cell.blob(),
        };
        stream.map_err(|e| e.in_column(self.name()))
    }

    /// Opens a character stream over the value.
    pub fn as_memo(&self) -> Result<MemoStream<'_>> {
        if self.is_null() {
            return Err(self.null_error());
        }
        let stream = match &self.storage {
            Storage::Owned {
                value: Some(Value::Memo(text) | Value::Text(text)),
                ..
            } => Ok(MemoStream::new(text.as_str())),
            Storage::Owned { value, .. } => {
                let value = value.as_ref().ok_or_else(|| self.null_error())?;
                Err(convert::unsupported(value.datatype(), Type::Memo).into())
            }
            Storage::Observing(cell) => cell.memo(),
        };
        stream.map_err(|e| e.in_column(self.name()))
    }

    /// Stores `value`. An observing variant writes through to its cell.
    pub fn set(&mut self, value: impl Into<Value>) -> Result<()> {
        self.store(Some(value.into()))
    }

    /// Stores a copy of `other`'s value, or NULL if `other` is NULL.
    pub fn assign(&mut self, other: &Self) -> Result<()> {
        if other.is_null() {
            return match &mut self.storage {
                Storage::Owned { null, datatype, .. } => {
                    *null = true;
                    if *datatype == Type::Unknown {
                        *datatype = other.datatype();
                    }
                    Ok(())
                }
                Storage::Observing(cell) => cell
                    .write(None)
                    .map_err(|e| e.in_column(self.name.as_deref())),
            };
        }
        let value = other.payload()?.map(Cow::into_owned);
        self.store(value)
    }

    fn store(&mut self, new_value: Option<Value>) -> Result<()> {
        match &mut self.storage {
            Storage::Owned {
                value,
                null,
                datatype,
            } => {
                if let Some(new_value) = &new_value {
                    *datatype = new_value.datatype();
                }
                *null = new_value.is_none();
                *value = new_value;
                Ok(())
            }
            Storage::Observing(cell) => cell
                .write(new_value)
                .map_err(|e| e.in_column(self.name.as_deref())),
        }
    }

    /// Re-reads an observed cell after the engine changed its storage.
    pub fn refresh(&mut self) {
        if let Storage::Observing(cell) = &mut self.storage {
            cell.refresh();
        }
    }

    /// A second handle to the value.
    ///
    /// If the observed storage can be shared the result observes the same
    /// storage; otherwise it is a deep copy.
    pub fn duplicate(&self) -> Self {
        if let Storage::Observing(cell) = &self.storage {
            if let Some(shared) = cell.share() {
                return Self {
                    name: self.name.clone(),
                    storage: Storage::Observing(shared),
                };
            }
        }
        self.deepcopy()
    }

    /// An owned copy that stays valid after the source is refreshed or
    /// released.
    ///
    /// A value the engine fails to produce is copied as NULL.
    pub fn deepcopy(&self) -> Self {
        let value = match self.payload() {
            Ok(value) => value.map(Cow::into_owned),
            Err(e) => {
                log::warn!("Copying unreadable value as NULL: {e}");
                None
            }
        };
        Self {
            name: self.name.clone(),
            storage: Storage::Owned {
                null: self.is_null() || value.is_none(),
                value,
                datatype: self.datatype(),
            },
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Variant {
    fn clone(&self) -> Self {
        self.deepcopy()
    }
}

impl std::fmt::Debug for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Variant");
        if let Some(name) = &self.name {
            s.field("name", name);
        }
        s.field("datatype", &self.datatype());
        match self.held() {
            Ok(value) => s.field("value", &*value),
            Err(_) => s.field("value", &"NULL"),
        };
        s.field("observing", &self.is_observing()).finish()
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.held() {
            Ok(value) => value.fmt(f),
            Err(_) => f.write_str("NULL"),
        }
    }
}

impl From<Value> for Variant {
    fn from(value: Value) -> Self {
        Self {
            name: None,
            storage: Storage::Owned {
                datatype: value.datatype(),
                value: Some(value),
                null: false,
            },
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Variant {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::new, |value| value.into().into())
    }
}

macro_rules! impl_from_native {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    Value::from(value).into()
                }
            }
        )*
    };
}

impl_from_native!(
    i8, u8, i16, u16, i32, u32, i64, u64, bool, f32, f64, String, &str, Vec<u8>, &[u8], Numeric,
    Date, Time, Timestamp, Interval,
);
