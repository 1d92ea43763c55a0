//! OS process table lookups.
//!
//! Child names are resolved on the poller thread and children are
//! reconciled on the UI side, so the table is shared behind an `Arc` and
//! takes `&self`.
//!
//! # Panic-Free Guarantees
//!
//! A poisoned lock is recovered with `into_inner`, never unwrapped.

use std::collections::HashMap;
use std::sync::Mutex;

use sysinfo::{Pid, System};
use tracing::debug;

/// Snapshot access to the live process list.
pub trait ProcessTable: Send + Sync {
    /// Returns every live process as PID → name.
    fn snapshot(&self) -> HashMap<u32, String>;

    /// Returns the name of a live process, or `None` if it has exited.
    fn name_of(&self, pid: u32) -> Option<String> {
        self.snapshot().remove(&pid)
    }
}

/// `ProcessTable` backed by `sysinfo`.
pub struct SystemProcessTable {
    system: Mutex<System>,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn snapshot(&self) -> HashMap<u32, String> {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_all();

        let processes: HashMap<u32, String> = system
            .processes()
            .iter()
            .map(|(pid, process)| (pid.as_u32(), process.name().to_string_lossy().into_owned()))
            .collect();

        debug!(count = processes.len(), "Refreshed process table");
        processes
    }

    fn name_of(&self, pid: u32) -> Option<String> {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_all();

        system
            .process(Pid::from_u32(pid))
            .map(|process| process.name().to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_table_sees_current_process() {
        let table = SystemProcessTable::new();
        let pid = std::process::id();

        assert!(table.snapshot().contains_key(&pid));
        assert!(table.name_of(pid).is_some());
    }
}
