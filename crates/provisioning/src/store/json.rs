use super::{Document, StoreResult};
use crate::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

/// A JSON document on disk
pub struct JsonFile<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T> {
    /// Document stored at `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Location of the document
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: Serialize + DeserializeOwned + Default> JsonFile<T> {
    fn load(&self) -> StoreResult<T> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(T::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, value: &T) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, value)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        debug!(path = %self.path.display(), "store document written");
        Ok(())
    }
}

impl<T: Serialize + DeserializeOwned + Default> Document<T> for JsonFile<T> {
    fn read(&self) -> StoreResult<T> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.load()
    }

    fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> StoreResult<R> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut value = self.load()?;
        let result = f(&mut value);
        self.store(&value)?;
        Ok(result)
    }
}
