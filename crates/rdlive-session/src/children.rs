//! Child process tracking.
//!
//! Children arrive from the poller as `SessionEvent::ChildAdded` and are
//! reconciled against the OS process list on the UI side at a fixed period.
//! A record disappears the moment its PID is gone, whether or not it was
//! ever surfaced.

use std::collections::HashMap;

use rdlive_core::ChildProcessRecord;
use tracing::{debug, info};

/// Changes produced by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildUpdate {
    /// Records whose process exited
    pub removed: Vec<ChildProcessRecord>,

    /// Records surfaced for the first time in this pass
    pub surfaced: Vec<ChildProcessRecord>,
}

impl ChildUpdate {
    /// Returns true if the pass changed anything visible.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.surfaced.is_empty()
    }
}

/// Live view of the target's child processes.
#[derive(Debug, Default)]
pub struct ChildTracker {
    children: Vec<ChildProcessRecord>,
}

impl ChildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new child. PID 0 and already known PIDs are ignored.
    pub fn add(&mut self, child: ChildProcessRecord) -> bool {
        if child.pid == 0 {
            debug!(ident = child.ident, "Ignoring child without a PID");
            return false;
        }
        if self.children.iter().any(|existing| existing.pid == child.pid) {
            debug!(pid = child.pid, "Child already known");
            return false;
        }

        info!(pid = child.pid, ident = child.ident, name = %child.name, "Child process added");
        self.children.push(child);
        true
    }

    /// Drops children absent from `live` and surfaces the rest.
    ///
    /// `live` maps PID to the current process name. A surfaced record keeps
    /// the name it was created with; the OS name only fills an empty one.
    pub fn reconcile(&mut self, live: &HashMap<u32, String>) -> ChildUpdate {
        let mut update = ChildUpdate::default();

        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.children)
            .into_iter()
            .partition(|child| live.contains_key(&child.pid));
        self.children = kept;

        for child in &removed {
            info!(pid = child.pid, tracked = child.tracked, "Child process exited");
        }
        update.removed = removed;

        for child in self.children.iter_mut().filter(|child| !child.tracked) {
            if child.name.is_empty() {
                child.name = live
                    .get(&child.pid)
                    .cloned()
                    .unwrap_or_else(|| ChildProcessRecord::UNKNOWN_NAME.to_string());
            }
            child.tracked = true;
            update.surfaced.push(child.clone());
        }

        update
    }

    /// Looks up a child by PID.
    pub fn get(&self, pid: u32) -> Option<&ChildProcessRecord> {
        self.children.iter().find(|child| child.pid == pid)
    }

    pub fn children(&self) -> &[ChildProcessRecord] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(pids: &[(u32, &str)]) -> HashMap<u32, String> {
        pids.iter()
            .map(|(pid, name)| (*pid, name.to_string()))
            .collect()
    }

    #[test]
    fn test_add_ignores_pid_zero_and_duplicates() {
        let mut tracker = ChildTracker::new();
        assert!(!tracker.add(ChildProcessRecord::new(0, 5, "ghost")));
        assert!(tracker.add(ChildProcessRecord::new(1234, 5, "worker")));
        assert!(!tracker.add(ChildProcessRecord::new(1234, 6, "worker")));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_reconcile_surfaces_once() {
        let mut tracker = ChildTracker::new();
        tracker.add(ChildProcessRecord::new(1234, 38921, "worker"));

        let first = tracker.reconcile(&live(&[(1234, "worker")]));
        assert_eq!(first.surfaced.len(), 1);
        assert!(first.removed.is_empty());
        assert!(tracker.get(1234).map(|c| c.tracked).unwrap_or(false));

        let second = tracker.reconcile(&live(&[(1234, "worker")]));
        assert!(second.is_empty());
    }

    #[test]
    fn test_reconcile_removes_exited_regardless_of_tracking() {
        let mut tracker = ChildTracker::new();
        tracker.add(ChildProcessRecord::new(1, 10, "a"));
        tracker.add(ChildProcessRecord::new(2, 11, "b"));
        tracker.reconcile(&live(&[(1, "a"), (2, "b")]));
        tracker.add(ChildProcessRecord::new(3, 12, "c"));

        let update = tracker.reconcile(&live(&[(2, "b")]));
        let removed: Vec<u32> = update.removed.iter().map(|c| c.pid).collect();
        assert_eq!(removed, vec![1, 3]);
        assert!(update.surfaced.is_empty());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_reconcile_fills_missing_name() {
        let mut tracker = ChildTracker::new();
        tracker.add(ChildProcessRecord::new(7, 1, ""));

        let update = tracker.reconcile(&live(&[(7, "helper")]));
        assert_eq!(update.surfaced[0].name, "helper");
    }
}
