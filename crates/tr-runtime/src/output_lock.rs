use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

/// One mutex per output file basename, created on first use.
///
/// Share a single `Arc<OutputLocks>` between engines to serialize writers
/// that target the same file from different threads.
#[derive(Debug, Default)]
pub struct OutputLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OutputLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(key).or_default())
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
