use crate::{
    convert::{self, extract},
    BlobStream, Error, MemoStream, Result, Type, Value,
};
use std::{cell::RefCell, rc::Rc};

/// Storage owned by an engine that a [`Variant`](crate::Variant) observes.
///
/// A cell reports the value currently stored in engine memory. Dropping the
/// boxed cell releases the engine-side storage.
pub trait BackendCell {
    fn datatype(&self) -> Type;

    fn is_null(&self) -> bool;

    /// The stored payload, which may be present even while the null flag is
    /// set. Engine failures while reading it are returned as errors.
    fn value(&self) -> Result<Option<Value>>;

    fn blob(&self) -> Result<BlobStream<'_>> {
        let value = self.value()?.ok_or(Error::NullValue { column: None })?;
        Ok(BlobStream::new(extract::<Vec<u8>>(&value)?))
    }

    fn memo(&self) -> Result<MemoStream<'_>> {
        let value = self.value()?.ok_or(Error::NullValue { column: None })?;
        match convert::convert(&value, Type::Memo)? {
            Value::Memo(text) | Value::Text(text) => Ok(MemoStream::new(text)),
            value => Err(convert::unsupported(value.datatype(), Type::Memo).into()),
        }
    }

    /// Stores `value` in engine memory; `None` stores NULL.
    fn write(&mut self, value: Option<Value>) -> Result<()> {
        let _ = value;
        Err(Error::ReadOnly {
            column: None,
            datatype: self.datatype(),
        })
    }

    fn set_null(&mut self, null: bool) -> Result<()> {
        let _ = null;
        Err(Error::ReadOnly {
            column: None,
            datatype: self.datatype(),
        })
    }

    /// Called after the engine has placed a new row in the cell's storage.
    fn refresh(&mut self) {}

    /// Another handle to the same storage, if the storage may be shared.
    fn share(&self) -> Option<Box<dyn BackendCell>> {
        None
    }
}

struct Slot {
    datatype: Type,
    value: Option<Value>,
    null: bool,
}

/// A caller-owned, typed value slot.
///
/// Clones share the slot. Binding a `SharedCell` as a statement parameter
/// lets the caller change the parameter between executions without binding
/// again. Writes are converted to the slot's type.
#[derive(Clone)]
pub struct SharedCell(Rc<RefCell<Slot>>);

impl SharedCell {
    /// A NULL slot of type `datatype`.
    pub fn new(datatype: Type) -> Self {
        Self(Rc::new(RefCell::new(Slot {
            datatype,
            value: None,
            null: true,
        })))
    }

    /// A slot holding `value`, typed after it.
    pub fn with_value(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self(Rc::new(RefCell::new(Slot {
            datatype: value.datatype(),
            value: Some(value),
            null: false,
        })))
    }

    pub fn get(&self) -> Option<Value> {
        let slot = self.0.borrow();
        if slot.null {
            None
        } else {
            slot.value.clone()
        }
    }

    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.store(Some(value.into()))
    }

    pub fn set_to_null(&self) {
        self.0.borrow_mut().null = true;
    }

    fn store(&self, value: Option<Value>) -> Result<()> {
        let mut slot = self.0.borrow_mut();
        match value {
            Some(value) => {
                let value = match slot.datatype {
                    Type::Unknown => value,
                    ty => convert::convert(&value, ty)?,
                };
                if slot.datatype == Type::Unknown {
                    slot.datatype = value.datatype();
                }
                slot.value = Some(value);
                slot.null = false;
            }
            None => slot.null = true,
        }
        Ok(())
    }
}

impl std::fmt::Debug for SharedCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.0.borrow();
        f.debug_struct("SharedCell")
            .field("datatype", &slot.datatype)
            .field("value", &slot.value)
            .field("null", &slot.null)
            .finish()
    }
}

impl BackendCell for SharedCell {
    fn datatype(&self) -> Type {
        self.0.borrow().datatype
    }

    fn is_null(&self) -> bool {
        let slot = self.0.borrow();
        slot.null || slot.value.is_none()
    }

    fn value(&self) -> Result<Option<Value>> {
        Ok(self.0.borrow().value.clone())
    }

    fn write(&mut self, value: Option<Value>) -> Result<()> {
        self.store(value)
    }

    fn set_null(&mut self, null: bool) -> Result<()> {
        self.0.borrow_mut().null = null;
        Ok(())
    }

    fn share(&self) -> Option<Box<dyn BackendCell>> {
        Some(Box::new(self.clone()))
    }
}
