//! Audit record output.
//!
//! Both binaries write the tracking parameters they sent or received to a
//! shared sink as indented JSON. Each record is written under a single lock
//! so concurrent handlers never interleave their output.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::params::TrackingParameters;

/// Cloneable handle to a serialized writer.
#[derive(Clone)]
pub struct RecordSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl RecordSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// A sink writing to memory, plus a handle for reading back what was
    /// written.
    pub fn memory() -> (Self, MemoryBuffer) {
        let buffer = MemoryBuffer::default();
        (Self::new(buffer.clone()), buffer)
    }

    /// Write the parameters as two-space indented JSON followed by a newline.
    pub fn emit_params(&self, params: &TrackingParameters) -> io::Result<()> {
        let mut record = serde_json::to_vec_pretty(params)?;
        record.push(b'\n');
        self.write_all(&record)
    }

    /// Write a line of text.
    pub fn line(&self, text: &str) -> io::Result<()> {
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');
        self.write_all(&line)
    }

    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "record sink poisoned"))?;
        writer.write_all(bytes)?;
        writer.flush()
    }
}

/// Shared in-memory buffer backing [`RecordSink::memory`].
#[derive(Clone, Default)]
pub struct MemoryBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryBuffer {
    pub fn contents(&self) -> String {
        self.bytes
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }
}

impl Write for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .bytes
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "buffer poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
