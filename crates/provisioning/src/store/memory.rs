use super::{Document, StoreResult};
use crate::error::StoreError;
use std::sync::Mutex;

/// A document held in memory, for tests and dry runs
#[derive(Default)]
pub struct InMemory<T> {
    value: Mutex<T>,
}

impl<T> InMemory<T> {
    /// Document starting with `value`
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }
}

impl<T: Clone + Send> Document<T> for InMemory<T> {
    fn read(&self) -> StoreResult<T> {
        Ok(self.value.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }

    fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> StoreResult<R> {
        let mut value = self.value.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut value))
    }
}
