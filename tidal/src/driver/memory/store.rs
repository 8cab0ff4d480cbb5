use crate::{Error, Result};
use crossbeam_skiplist::SkipMap;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

type Snapshot = Vec<(Vec<u8>, Vec<u8>)>;

/// Ordered key-value storage of one database.
///
/// Readers never block. Writers take the writer lock, which one connection
/// holds from its first write until its transaction ends.
pub(super) struct Store {
    name: String,
    data: SkipMap<Box<[u8]>, Box<[u8]>>,
    writer: Mutex<Option<u64>>,
    path: Option<PathBuf>,
}

impl Store {
    /// A database that lives only as long as the store.
    pub fn in_memory(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            data: SkipMap::new(),
            writer: Mutex::new(None),
            path: None,
        }
    }

    /// Loads the database file at `path`, creating it if it does not exist
    /// and `create` is set.
    pub fn open(path: &Path, create: bool) -> Result<Self> {
        let store = Self {
            name: path.display().to_string(),
            data: SkipMap::new(),
            writer: Mutex::new(None),
            path: Some(path.to_owned()),
        };
        if path.exists() {
            let bytes = fs::read(path).map_err(|e| io_error(path, &e))?;
            let snapshot: Snapshot = bincode::deserialize(&bytes).map_err(|e| {
                Error::engine("XX001", format!("Corrupt database file {}: {e}", path.display()))
            })?;
            for (key, value) in snapshot {
                store
                    .data
                    .insert(key.into_boxed_slice(), value.into_boxed_slice());
            }
            log::debug!("Loaded database {} ({} entries)", path.display(), store.data.len());
        } else if create {
            log::info!("Creating database file {}", path.display());
            store.persist()?;
        } else {
            return Err(Error::engine(
                "08001",
                format!("Database file {} does not exist", path.display()),
            ));
        }
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &[u8]) -> Option<Box<[u8]>> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    /// Entries whose keys start with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Box<[u8]>, Box<[u8]>)> {
        self.data
            .range(Box::<[u8]>::from(prefix)..)
            .take_while(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// The greatest key starting with `prefix`.
    pub fn last_key(&self, prefix: &[u8]) -> Option<Box<[u8]>> {
        let mut end = prefix.to_vec();
        // Prefixes are fixed-width big-endian ids, so incrementing the last
        // byte that is not 0xff yields the first key past the prefix.
        while let Some(byte) = end.pop() {
            if byte < u8::MAX {
                end.push(byte + 1);
                break;
            }
        }
        let start = Box::<[u8]>::from(prefix);
        let entry = if end.is_empty() {
            self.data.range(start..).next_back()
        } else {
            self.data.range(start..end.into_boxed_slice()).next_back()
        };
        entry.map(|entry| entry.key().clone())
    }

    fn put(&self, key: Box<[u8]>, value: Box<[u8]>) {
        self.data.insert(key, value);
    }

    fn delete(&self, key: &[u8]) {
        self.data.remove(key);
    }

    /// Takes the writer lock for connection `conn`.
    pub fn lock_writer(&self, conn: u64) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match *writer {
            Some(holder) if holder != conn => Err(Error::Busy(format!(
                "database {} is being written by another connection",
                self.name
            ))),
            _ => {
                *writer = Some(conn);
                Ok(())
            }
        }
    }

    pub fn unlock_writer(&self, conn: u64) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if *writer == Some(conn) {
            *writer = None;
        }
    }

    /// Writes the whole database to its file, replacing the file atomically.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot: Snapshot = self
            .data
            .iter()
            .map(|entry| (entry.key().to_vec(), entry.value().to_vec()))
            .collect();
        let bytes = bincode::serialize(&snapshot)
            .map_err(|e| Error::engine("XX000", format!("Cannot encode database: {e}")))?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes).map_err(|e| io_error(&tmp, &e))?;
        fs::rename(&tmp, path).map_err(|e| io_error(path, &e))?;
        log::debug!("Wrote database {} ({} entries)", path.display(), snapshot.len());
        Ok(())
    }
}

fn io_error(path: &Path, e: &std::io::Error) -> Error {
    Error::engine("58030", format!("I/O error on {}: {e}", path.display()))
}

/// Previous values of the keys a transaction wrote, oldest first.
#[derive(Default)]
pub(super) struct UndoLog(Vec<(Box<[u8]>, Option<Box<[u8]>>)>);

impl UndoLog {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Restores the values as they were when the log had `mark` entries.
    pub fn rollback_to(&mut self, store: &Store, mark: usize) {
        while self.0.len() > mark {
            let Some((key, prev)) = self.0.pop() else {
                break;
            };
            match prev {
                Some(value) => store.put(key, value),
                None => store.delete(&key),
            }
        }
    }

    pub fn rollback(&mut self, store: &Store) {
        self.rollback_to(store, 0);
    }
}

/// Writes to a store, recording every change in an undo log.
pub(super) struct Txn<'a> {
    store: &'a Store,
    undo: &'a mut UndoLog,
}

impl<'a> Txn<'a> {
    pub fn new(store: &'a Store, undo: &'a mut UndoLog) -> Self {
        Self { store, undo }
    }

    pub fn store(&self) -> &'a Store {
        self.store
    }

    /// Inserts a key-value pair.
    ///
    /// Returns true if the key was newly inserted, false if it already existed.
    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) -> bool {
        let prev = self.store.get(key);
        let was_present = prev.is_some();
        self.store.put(key.into(), value.into_boxed_slice());
        self.undo.0.push((key.into(), prev));
        !was_present
    }

    /// Removes a key. Returns the value if the key existed.
    pub fn remove(&mut self, key: &[u8]) -> Option<Box<[u8]>> {
        let prev = self.store.get(key)?;
        self.store.delete(key);
        self.undo.0.push((key.into(), Some(prev.clone())));
        Some(prev)
    }
}
