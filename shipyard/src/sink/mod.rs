//! Log sinks
//!
//! Every line a deployment produces (progress messages and the output of the
//! commands it runs) is written to a [`LogSink`]. Callers usually hand the
//! engine a [`MultiSink`] that fans lines out to a live transport (console or
//! an SSE response) and to a [`CaptureSink`] whose transcript is persisted
//! once the call returns.

pub mod capture;
pub mod console;
pub mod sse;

use std::sync::Arc;

pub use capture::CaptureSink;
pub use console::ConsoleSink;
pub use sse::SseSink;

/// Destination for deployment log lines
pub trait LogSink: Send + Sync {
    /// Write a single line (without trailing newline)
    fn write_line(&self, line: &str);

    /// Push buffered lines to the underlying transport
    fn flush(&self) {}

    /// Write a line and flush immediately
    fn emit(&self, line: &str) {
        self.write_line(line);
        self.flush();
    }
}

/// Fan-out sink that delivers every line to all of its children
#[derive(Clone, Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { sinks }
    }

    /// Add another destination
    pub fn with(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl LogSink for MultiSink {
    fn write_line(&self, line: &str) {
        for sink in &self.sinks {
            sink.write_line(line);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

/// Sink that discards everything, for output that is parsed rather than shown
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn write_line(&self, _line: &str) {}
}
