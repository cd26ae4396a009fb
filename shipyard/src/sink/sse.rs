//! Server-sent events sink
//!
//! Lines are pushed into an unbounded channel whose receiving half backs an
//! axum `Sse` response, one event per line. A closed receiver (client went
//! away) silently drops further lines so the deployment itself keeps going.

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};

use super::LogSink;

/// Prefix of the final line emitted when a streamed operation fails
pub const ERROR_SENTINEL: &str = "__ERROR__: ";

/// Format the failure sentinel line
pub fn error_line(message: &str) -> String {
    format!("{}{}", ERROR_SENTINEL, message)
}

/// Sink feeding a streaming HTTP response
#[derive(Debug, Clone)]
pub struct SseSink {
    tx: UnboundedSender<String>,
}

impl SseSink {
    /// Create a sink and the receiver the response stream reads from
    pub fn channel() -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl LogSink for SseSink {
    fn write_line(&self, line: &str) {
        // SSE cannot carry carriage returns
        let _ = self.tx.unbounded_send(line.replace('\r', ""));
    }
}
