//! Message Log Sink
//!
//! Every relayed, blocked or passed-through message produces one line. Both
//! directions of a pair write to the same sink, so each line is emitted whole
//! under a single lock.

use std::fmt;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::warn;

use crate::protocol::Header;

/// Shared, line-serializing output for message logs.
pub struct LogSink {
    writer: Mutex<Box<dyn Write + Send>>,
    flush_each_line: bool,
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

impl LogSink {
    /// A sink that flushes after every line.
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            flush_each_line: true,
        }
    }

    /// A sink that buffers lines and writes them out when the buffer fills
    /// or on [`LogSink::flush`].
    pub fn buffered<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Mutex::new(Box::new(BufWriter::new(writer))),
            flush_each_line: false,
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn stdout_buffered() -> Self {
        Self::buffered(io::stdout())
    }

    /// A sink writing into memory, with a handle to read the lines back.
    pub fn memory() -> (Self, MemoryLog) {
        let log = MemoryLog::default();
        (Self::new(log.clone()), log)
    }

    /// Write one line. Write failures are reported and otherwise ignored.
    pub fn write_line(&self, line: &str) {
        let line = line.trim_end_matches('\n');
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut result = writer.write_all(&bytes);
        if self.flush_each_line {
            result = result.and_then(|_| writer.flush());
        }
        if let Err(e) = result {
            warn!("Failed to write message log line: {}", e);
        }
    }

    /// Push buffered lines to the underlying writer.
    pub fn flush(&self) {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writer.flush() {
            warn!("Failed to flush message log: {}", e);
        }
    }

    pub fn record(&self, line: &LogLine<'_>) {
        self.write_line(&line.to_string());
    }
}

/// One message log entry:
/// `[session] <receipt time> <message timestamp> <device name> <device type> <fields>`.
#[derive(Debug)]
pub struct LogLine<'a> {
    pub session: &'a str,
    pub received: SystemTime,
    pub header: &'a Header,
    pub fields: String,
}

impl<'a> LogLine<'a> {
    pub fn new(session: &'a str, received: SystemTime, header: &'a Header, fields: String) -> Self {
        Self {
            session,
            received,
            header,
            fields,
        }
    }
}

impl fmt::Display for LogLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} {} {}",
            self.session,
            humantime::format_rfc3339_millis(self.received),
            self.header.timestamp(),
            self.header.device_name(),
            self.header.device_type(),
            self.fields
        )
    }
}

/// In-memory capture of a [`LogSink`].
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryLog {
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for MemoryLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
