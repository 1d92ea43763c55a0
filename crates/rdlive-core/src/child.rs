//! Child processes spawned by a target under capture.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A child process reported by the target connection.
///
/// Identity (`pid`, `ident`, `name`) is fixed at creation. The only mutable
/// part is `tracked`, which flips once the record has been surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildProcessRecord {
    /// OS process ID
    pub pid: u32,

    /// Target-control identifier to open a session against the child
    pub ident: u32,

    /// Process name resolved from the OS process table
    pub name: String,

    /// Whether the record has already been surfaced to the UI
    pub tracked: bool,
}

impl ChildProcessRecord {
    /// Name used when the OS no longer knows the process.
    pub const UNKNOWN_NAME: &'static str = "Unknown Process";

    /// Creates an untracked record.
    pub fn new(pid: u32, ident: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            ident,
            name: name.into(),
            tracked: false,
        }
    }
}

impl fmt::Display for ChildProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [PID {}]", self.name, self.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_child_is_untracked() {
        let child = ChildProcessRecord::new(1234, 38920, "worker");
        assert!(!child.tracked);
        assert_eq!(child.to_string(), "worker [PID 1234]");
    }
}
