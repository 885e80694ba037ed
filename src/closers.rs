//! Registry of cleanup actions run before the process reports its exit code.
//!
//! Each lifecycle owns one registry. The log router registers the log file's
//! closer; the lifecycle drains the registry exactly once on every exit path
//! through a [`CloseGuard`].

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

type Closer = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Mutex-protected list of pending closers.
#[derive(Clone, Default)]
pub struct Closers {
    pending: Arc<Mutex<Vec<(String, Closer)>>>,
}

impl Closers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closer under a name used when reporting its failure.
    pub fn register<F>(&self, name: impl Into<String>, closer: F)
    where
        F: FnOnce() -> io::Result<()> + Send + 'static,
    {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.into(), Box::new(closer)));
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run and remove every registered closer, most recent first.
    ///
    /// Failures are collected, not propagated: one closer failing does not
    /// stop the others.
    pub fn close_all(&self) -> Vec<(String, io::Error)> {
        let drained = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        drained
            .into_iter()
            .rev()
            .filter_map(|(name, closer)| closer().err().map(|err| (name, err)))
            .collect()
    }

    /// Guard that drains the registry when dropped, including on unwind.
    pub fn guard(&self) -> CloseGuard {
        CloseGuard {
            closers: self.clone(),
        }
    }
}

/// Drains a [`Closers`] registry on drop.
pub struct CloseGuard {
    closers: Closers,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        for (name, err) in self.closers.close_all() {
            warn!(closer = %name, error = %err, "failed to close resource");
        }
    }
}
