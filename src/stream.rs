//! Shared output streams.
//!
//! The lifecycle never writes to the process streams directly: stdout and
//! stderr are [`Stream`] handles so tests can capture them and log files can
//! be closed while a logger still holds a clone.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Sink = Box<dyn Write + Send>;

/// Cloneable, closable writer. Clones share the same underlying sink.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<Mutex<Option<Sink>>>,
    process: bool,
}

impl Stream {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(writer)))),
            process: false,
        }
    }

    pub fn stdout() -> Self {
        Self {
            process: true,
            ..Self::new(io::stdout())
        }
    }

    pub fn stderr() -> Self {
        Self {
            process: true,
            ..Self::new(io::stderr())
        }
    }

    /// Whether this wraps one of the process's own streams.
    pub fn is_process_stream(&self) -> bool {
        self.process
    }

    fn lock(&self) -> MutexGuard<'_, Option<Sink>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flush and drop the sink. Later writes are discarded; closing twice
    /// is a no-op.
    pub fn close(&self) -> io::Result<()> {
        match self.lock().take() {
            Some(mut sink) => sink.flush(),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.lock().as_mut() {
            Some(sink) => sink.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.lock().as_mut() {
            Some(sink) => sink.write_all(buf),
            None => Ok(()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock().as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

/// In-memory sink for capturing output.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn stream(&self) -> Stream {
        Stream::new(self.clone())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
