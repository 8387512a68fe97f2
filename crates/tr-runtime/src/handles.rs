use std::sync::Arc;

use parking_lot::Mutex;

/// In-memory file registered with an engine and referenced from scripts as `@name`.
#[derive(Debug, Clone, Default)]
pub struct MemoryHandle(Arc<Mutex<Vec<u8>>>);

impl MemoryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self(Arc::new(Mutex::new(text.as_bytes().to_vec())))
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn write(&self, text: &str) {
        self.0.lock().extend_from_slice(text.as_bytes());
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}
