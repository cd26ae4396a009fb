//! Terminal sink

use std::io::Write;

use super::LogSink;

/// Writes lines to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn write_line(&self, line: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", line);
    }

    fn flush(&self) {
        let _ = std::io::stdout().lock().flush();
    }
}
