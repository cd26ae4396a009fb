//! In-memory transcript sink

use std::sync::{Arc, Mutex};

use super::LogSink;

/// Append-only buffer of every line written, shared between clones
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    buffer: Arc<Mutex<String>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full transcript captured so far
    pub fn transcript(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

impl LogSink for CaptureSink {
    fn write_line(&self, line: &str) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push_str(line);
        buffer.push('\n');
    }
}
