//! Lock owner identity and process liveness.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The process holding (or requesting) a lock.
///
/// Identity is `(pid, host)`; `operation` is the command line being run and
/// only shows up in progress and diagnostic output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub pid: u32,
    pub host: String,
    #[serde(default)]
    pub operation: String,
}

impl Owner {
    pub fn new(pid: u32, host: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            pid,
            host: host.into(),
            operation: operation.into(),
        }
    }

    /// Owner for the calling process on this host.
    pub fn current(operation: impl Into<String>) -> Self {
        Self::new(std::process::id(), local_host(), operation)
    }

    /// Same process, regardless of the operation text.
    pub fn is(&self, other: &Owner) -> bool {
        self.pid == other.pid && self.host == other.host
    }

    pub fn is_local(&self) -> bool {
        self.host == local_host()
    }

    /// Whether this owner is known to be gone.
    ///
    /// Only owners on this host can be probed; remote owners are never
    /// reported stale.
    pub fn is_stale(&self) -> bool {
        self.is_local() && !is_pid_alive(self.pid)
    }
}

impl PartialEq for Owner {
    fn eq(&self, other: &Self) -> bool {
        self.is(other)
    }
}

impl Eq for Owner {}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}@{}", self.pid, self.host)
    }
}

/// Hostname of this machine, `localhost` if it cannot be determined.
pub fn local_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Check whether a pid exists on this host with `kill(pid, 0)`.
pub fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    #[cfg(unix)]
    {
        // SAFETY: signal 0 performs the permission and existence checks only.
        let result = unsafe { libc::kill(pid_i32, 0) };
        if result == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to somebody else.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid_i32;
        true
    }
}
