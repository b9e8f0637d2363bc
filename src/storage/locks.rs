// Advisory per-filename locks

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Map of filename -> mutex, used to serialize the final rename of
/// concurrent uploads to one name. Entries are dropped once unused.
#[derive(Default)]
pub struct FileLocks {
    entries: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `name`.
    ///
    /// The lock is released when `f` returns or unwinds.
    pub fn with_lock<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let entry = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(entries.entry(name.to_string()).or_default())
        };

        let result = {
            let _guard = entry.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        // map + this call; nobody else is waiting
        if Arc::strong_count(&entry) == 2 {
            entries.remove(name);
        }

        result
    }

    /// Number of names currently tracked
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
