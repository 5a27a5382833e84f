use std::sync::{Mutex, PoisonError};

use crate::error::Result;

/// Read contract shared by every simulation data source.
///
/// `snapshot` returns a whole, owned copy of the most recent value. A value
/// is never observed half-written, whichever transport sits behind it.
pub trait LatestValueProvider: Send + Sync {
    type Value: Clone + Send;

    fn snapshot(&self) -> Result<Self::Value>;
}

/// In-process latest-value slot.
///
/// Writers replace the whole value; readers clone it. Both go through the
/// same mutex, so a reader sees either the previous or the new value.
#[derive(Debug, Default)]
pub struct LatestState<T> {
    slot: Mutex<T>,
}

impl<T: Clone> LatestState<T> {
    pub fn new(initial: T) -> Self {
        Self {
            slot: Mutex::new(initial),
        }
    }

    /// Copy of the current value.
    pub fn get(&self) -> T {
        // A poisoned slot still holds a whole value: it is only ever swapped.
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in `value` and return the previous one.
    pub fn replace(&self, value: T) -> T {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, value)
    }
}

impl<T: Clone + Send> LatestValueProvider for LatestState<T> {
    type Value = T;

    fn snapshot(&self) -> Result<T> {
        Ok(self.get())
    }
}
