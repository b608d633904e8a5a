//! Append-only console sink with per-stage prefixing.
//!
//! Operator-facing text (wait progress, per-stage output, warnings) goes
//! through a [`Console`]; diagnostics go through `tracing`.

use std::fmt::Display;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Cloneable handle to the output streams of one command invocation.
#[derive(Clone)]
pub struct Console {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    info: Box<dyn Write + Send>,
    error: Box<dyn Write + Send>,
    prefix: String,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("prefix", &self.prefix())
            .finish_non_exhaustive()
    }
}

impl Console {
    /// Console writing info to stdout and errors to stderr.
    pub fn stdio() -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    pub fn new(info: Box<dyn Write + Send>, error: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                info,
                error,
                prefix: String::new(),
            })),
        }
    }

    /// Console that captures both streams into one in-memory buffer.
    pub fn buffered() -> (Self, Captured) {
        let captured = Captured::default();
        let console = Self::new(Box::new(captured.clone()), Box::new(captured.clone()));
        (console, captured)
    }

    /// Console that discards everything.
    pub fn null() -> Self {
        Self::new(Box::new(io::sink()), Box::new(io::sink()))
    }

    pub fn info(&self, message: impl Display) {
        self.write_line(false, message);
    }

    pub fn error(&self, message: impl Display) {
        self.write_line(true, message);
    }

    pub fn prefix(&self) -> String {
        self.lock().prefix.clone()
    }

    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.lock().prefix = prefix.into();
    }

    /// Set the prefix until the returned guard is dropped.
    pub fn scoped_prefix(&self, prefix: impl Into<String>) -> PrefixGuard<'_> {
        let previous = std::mem::replace(&mut self.lock().prefix, prefix.into());
        PrefixGuard {
            console: self,
            previous,
        }
    }

    fn write_line(&self, error: bool, message: impl Display) {
        let mut inner = self.lock();
        let text = message.to_string();
        let prefix = inner.prefix.clone();
        let stream = if error {
            &mut inner.error
        } else {
            &mut inner.info
        };
        for line in text.lines() {
            // Console output is best effort; a closed pipe must not fail a command.
            let _ = writeln!(stream, "{prefix}{line}");
        }
        let _ = stream.flush();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while printing leaves the streams usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Restores the previous console prefix on drop.
pub struct PrefixGuard<'a> {
    console: &'a Console,
    previous: String,
}

impl Drop for PrefixGuard<'_> {
    fn drop(&mut self) {
        self.console.set_prefix(std::mem::take(&mut self.previous));
    }
}

/// Shared in-memory buffer behind [`Console::buffered`].
#[derive(Debug, Clone, Default)]
pub struct Captured {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Captured {
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buffer).to_string()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
