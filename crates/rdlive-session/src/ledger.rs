//! Capture ledger - every capture a session has seen, and the save/delete
//! decisions made against them.
//!
//! # Storage routing
//!
//! An unsaved capture is a temporary file someone must eventually delete.
//! Depending on where it lives and what is still connected, that is:
//!
//! | capture | live connection | route |
//! |---------|-----------------|-------|
//! | local   | any             | local filesystem |
//! | remote  | connected       | request through the poller |
//! | remote  | gone            | replay context on the capture's host |
//!
//! A saved capture belongs to the user and is never deleted.
//!
//! # Panic-Free Guarantees
//!
//! Failed operations return `LiveError` and leave the record as it was: a
//! failed save never marks a record saved, a failed delete keeps it listed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rdlive_core::{CaptureId, CaptureRecord};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::LiveError;
use crate::host::{PromptAnswer, ReplayContext, SessionHost};
use crate::poller::RequestHandle;

/// Collaborators a ledger operation may need.
pub struct LedgerEnv<'a> {
    /// Host the session is connected to (empty for local)
    pub host_name: &'a str,

    pub host: &'a mut dyn SessionHost,

    pub replay: &'a mut dyn ReplayContext,

    /// Request channel, present only while the live connection is up
    pub requests: Option<&'a RequestHandle>,
}

impl LedgerEnv<'_> {
    fn replay_available(&self) -> bool {
        self.replay.is_connected_to(self.host_name)
    }

    fn live(&self) -> Option<&RequestHandle> {
        self.requests.filter(|requests| requests.is_connected())
    }
}

/// Result of a save that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The file is at its destination and the record is saved
    Saved(PathBuf),

    /// A copy through the live connection is in flight
    Pending(PathBuf),

    /// The user dismissed the save dialog
    Cancelled,
}

/// What `clean_items` did with each unsaved capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Deleted, or delete requested through the connection
    pub deleted: Vec<CaptureId>,

    /// Handed to the host because it has the file open
    pub handed_off: Vec<CaptureId>,

    /// Left on the remote host with nobody able to delete them
    pub abandoned: Vec<CaptureId>,
}

/// In-memory collection of a session's captures.
#[derive(Debug, Default)]
pub struct CaptureLedger {
    records: Vec<CaptureRecord>,
}

impl CaptureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a newly announced capture.
    pub fn add(&mut self, record: CaptureRecord) {
        if self.get(record.id).is_some() {
            warn!(capture_id = %record.id, "Duplicate capture ID from target");
        }
        info!(capture_id = %record.id, name = %record.name, local = record.local, "Capture added");
        self.records.push(record);
    }

    pub fn get(&self, id: CaptureId) -> Option<&CaptureRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    fn get_mut(&mut self, id: CaptureId) -> Result<&mut CaptureRecord, LiveError> {
        self.records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(LiveError::CaptureNotFound(id))
    }

    pub fn records(&self) -> &[CaptureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sets the display name of a capture.
    pub fn rename(&mut self, id: CaptureId, name: impl Into<String>) -> Result<(), LiveError> {
        let record = self.get_mut(id)?;
        record.name = name.into();
        Ok(())
    }

    /// Applies a finished copy: the capture now lives at `path` locally.
    ///
    /// Completes a pending save to the same path.
    pub fn mark_copied(&mut self, id: CaptureId, path: &Path, host: &mut dyn SessionHost) {
        let Ok(record) = self.get_mut(id) else {
            debug!(capture_id = %id, "Copy finished for unknown capture");
            return;
        };

        record.local = true;
        record.path = path.to_path_buf();

        if record.save_pending.as_deref() == Some(path) {
            record.save_pending = None;
            record.saved = true;
            info!(capture_id = %id, path = %path.display(), "Capture saved");
            host.add_recent_file(path);
        }
    }

    /// Turns saves still waiting on a copy back into unsaved captures.
    ///
    /// Called once the live connection is gone: no `CaptureCopied` can
    /// arrive any more. Returns how many saves were dropped.
    pub fn abort_pending_copies(&mut self) -> usize {
        let mut aborted = 0;
        for record in self.records.iter_mut().filter(|record| record.is_busy()) {
            if let Some(dest) = record.save_pending.take() {
                warn!(capture_id = %record.id, dest = %dest.display(), "Copy never completed, capture is unsaved again");
                aborted += 1;
            }
        }
        aborted
    }

    /// Marks a capture saved after the host took ownership of its file.
    pub fn hand_over(&mut self, id: CaptureId, host: &mut dyn SessionHost) -> Result<(), LiveError> {
        let record = self.get_mut(id)?;
        if !record.saved {
            record.saved = true;
            host.take_capture_ownership();
        }
        Ok(())
    }

    // ========================================================================
    // Save
    // ========================================================================

    /// Asks for a destination and saves the capture there.
    pub fn save(&mut self, id: CaptureId, env: &mut LedgerEnv<'_>) -> Result<SaveOutcome, LiveError> {
        let record = self.get(id).ok_or(LiveError::CaptureNotFound(id))?;
        if record.is_busy() {
            return Err(LiveError::CaptureBusy(id));
        }

        let Some(dest) = env.host.choose_save_path(record) else {
            debug!(capture_id = %id, "Save cancelled");
            return Ok(SaveOutcome::Cancelled);
        };

        self.save_to(id, &dest, env)
    }

    /// Saves the capture to `dest`.
    pub fn save_to(
        &mut self,
        id: CaptureId,
        dest: &Path,
        env: &mut LedgerEnv<'_>,
    ) -> Result<SaveOutcome, LiveError> {
        let record = self.get(id).ok_or(LiveError::CaptureNotFound(id))?;
        if record.is_busy() {
            return Err(LiveError::CaptureBusy(id));
        }
        let source = record.path.clone();

        if record.local {
            if same_file(&source, dest) {
                debug!(capture_id = %id, "Saving capture in place");
            } else {
                // The user already confirmed overwriting
                if dest.exists() {
                    fs::remove_file(dest).map_err(|e| LiveError::storage(dest, e))?;
                }
                fs::copy(&source, dest).map_err(|e| LiveError::storage(dest, e))?;
            }
        } else if let Some(requests) = env.live() {
            if !requests.copy_capture(id, dest) {
                return Err(LiveError::SessionClosed);
            }
            let record = self.get_mut(id)?;
            record.save_pending = Some(dest.to_path_buf());
            info!(capture_id = %id, dest = %dest.display(), "Copy requested through live connection");
            return Ok(SaveOutcome::Pending(dest.to_path_buf()));
        } else {
            if !env.replay_available() {
                return Err(LiveError::NoReplayContext {
                    host: env.host_name.to_string(),
                });
            }

            env.replay
                .copy_capture_from_remote(&source, dest)
                .map_err(|e| LiveError::storage(dest, e))?;

            if !dest.exists() {
                return Err(LiveError::storage(
                    dest,
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        "file couldn't be transferred from remote host",
                    ),
                ));
            }

            if let Err(e) = env.replay.delete_capture(&source, false) {
                warn!(path = %source.display(), error = %e, "Failed to delete remote temporary capture");
            }
        }

        let record = self.get_mut(id)?;
        record.saved = true;
        record.path = dest.to_path_buf();
        record.local = true;
        info!(capture_id = %id, dest = %dest.display(), "Capture saved");
        env.host.add_recent_file(dest);

        Ok(SaveOutcome::Saved(dest.to_path_buf()))
    }

    // ========================================================================
    // Open
    // ========================================================================

    /// Loads a capture in the host.
    pub fn open(&mut self, id: CaptureId, env: &mut LedgerEnv<'_>) -> Result<(), LiveError> {
        let remote_blocked = !env.replay_available();
        let record = self.get_mut(id)?;
        if record.is_busy() {
            return Err(LiveError::CaptureBusy(id));
        }

        record.opened = true;

        if record.is_remote() && remote_blocked {
            return Err(LiveError::NoReplayContext {
                host: env.host_name.to_string(),
            });
        }

        debug!(capture_id = %id, path = %record.path.display(), "Opening capture");
        env.host
            .load_capture(&record.path, record.is_temporary(), record.local);
        Ok(())
    }

    /// Copies a local capture to a fresh temporary file and launches a new
    /// application instance on it.
    pub fn open_in_new_instance(
        &self,
        id: CaptureId,
        temp_dir: &Path,
        host: &mut dyn SessionHost,
    ) -> Result<PathBuf, LiveError> {
        let record = self.get(id).ok_or(LiveError::CaptureNotFound(id))?;
        if record.is_remote() {
            return Err(LiveError::RemoteCapture(id));
        }

        fs::create_dir_all(temp_dir).map_err(|e| LiveError::storage(temp_dir, e))?;
        let temp_path = temp_dir.join(format!(
            "newwindow_{}_{}.rdc",
            id,
            Utc::now().timestamp_millis()
        ));

        fs::copy(&record.path, &temp_path).map_err(|e| LiveError::storage(&temp_path, e))?;
        host.launch_new_instance(&temp_path)
            .map_err(|e| LiveError::storage(&temp_path, e))?;

        info!(capture_id = %id, path = %temp_path.display(), "Opened capture in new instance");
        Ok(temp_path)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Deletes the given captures, asking once if any of them is unsaved.
    ///
    /// Failures are reported to the host and do not stop the remaining
    /// deletes. Returns how many captures were removed.
    pub fn delete_captures(&mut self, ids: &[CaptureId], env: &mut LedgerEnv<'_>) -> usize {
        let any_unsaved = ids
            .iter()
            .filter_map(|id| self.get(*id))
            .any(|record| !record.saved);

        if any_unsaved && !env.host.confirm_delete(ids.len()) {
            debug!(count = ids.len(), "Delete cancelled");
            return 0;
        }

        let mut removed = 0;
        for id in ids {
            match self.delete_unprompted(*id, env) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(capture_id = %id, error = %e, "Failed to delete capture");
                    env.host.report_error(&e);
                }
            }
        }
        removed
    }

    /// Releases a capture's temporary storage and removes it from the
    /// ledger. A saved capture is only removed from the list.
    pub fn delete_unprompted(&mut self, id: CaptureId, env: &mut LedgerEnv<'_>) -> Result<(), LiveError> {
        let record = self.get(id).ok_or(LiveError::CaptureNotFound(id))?;
        if record.is_busy() {
            return Err(LiveError::CaptureBusy(id));
        }

        if !record.saved {
            if env.host.current_capture_path().as_deref() == Some(record.path.as_path()) {
                env.host.take_capture_ownership();
                env.host.close_capture();
            } else if let (true, Some(requests)) = (record.is_remote(), env.live()) {
                if !requests.delete_capture(id) {
                    return Err(LiveError::SessionClosed);
                }
            } else if record.local {
                remove_local(&record.path)?;
            } else if env.replay_available() {
                env.replay
                    .delete_capture(&record.path, false)
                    .map_err(|e| LiveError::storage(&record.path, e))?;
            } else {
                return Err(LiveError::NoReplayContext {
                    host: env.host_name.to_string(),
                });
            }
        }

        info!(capture_id = %id, saved = record.saved, "Capture removed");
        self.records.retain(|record| record.id != id);
        Ok(())
    }

    // ========================================================================
    // Close
    // ========================================================================

    /// Prompts for every unsaved capture before the session closes.
    ///
    /// "Yes" saves now; "No" leaves the capture for `clean_items`. Returns
    /// false if the close must be aborted (cancel, failed save, or a remote
    /// capture the user would not abandon).
    pub fn confirmable_close(&mut self, env: &mut LedgerEnv<'_>) -> bool {
        let mut suppress_remote_warning = false;

        let pending: Vec<CaptureId> = self
            .records
            .iter()
            .filter(|record| !record.saved && !record.is_busy())
            .map(|record| record.id)
            .collect();

        for id in pending {
            let Some(record) = self.get(id) else {
                continue;
            };

            let mut answer = if suppress_remote_warning {
                PromptAnswer::No
            } else {
                env.host.prompt_unsaved(record)
            };

            if answer == PromptAnswer::Cancel {
                info!("Close cancelled by user");
                return false;
            }

            let unreachable = record.is_remote() && env.live().is_none() && !env.replay_available();
            if !suppress_remote_warning && unreachable {
                let saving = answer == PromptAnswer::Yes;
                if env.host.prompt_abandon_remote(env.host_name, record, saving) {
                    suppress_remote_warning = true;
                    answer = PromptAnswer::No;
                } else {
                    info!(capture_id = %id, "Close aborted, remote capture unreachable");
                    return false;
                }
            }

            if answer == PromptAnswer::Yes {
                match self.save(id, env) {
                    Ok(SaveOutcome::Saved(_)) | Ok(SaveOutcome::Pending(_)) => {}
                    Ok(SaveOutcome::Cancelled) => return false,
                    Err(e) => {
                        warn!(capture_id = %id, error = %e, "Save on close failed");
                        env.host.report_error(&e);
                        return false;
                    }
                }
            }
        }

        true
    }

    /// Disposes of every remaining unsaved capture and drops saved ones
    /// from the list. Captures with a copy in flight stay in the ledger.
    ///
    /// Deletes routed through the live connection are only enqueued here;
    /// the poller issues them before it shuts the connection down.
    pub fn clean_items(&mut self, env: &mut LedgerEnv<'_>) -> CleanupReport {
        let mut report = CleanupReport::default();
        let current = env.host.current_capture_path();

        for record in std::mem::take(&mut self.records) {
            if record.is_busy() {
                self.records.push(record);
                continue;
            }
            if record.saved {
                continue;
            }

            if current.as_deref() == Some(record.path.as_path()) {
                env.host.take_capture_ownership();
                report.handed_off.push(record.id);
                continue;
            }

            if record.is_remote() {
                if let Some(requests) = env.requests.filter(|r| r.is_connected()) {
                    if requests.delete_capture(record.id) {
                        report.deleted.push(record.id);
                        continue;
                    }
                }

                if env.replay.is_connected_to(env.host_name) {
                    match env.replay.delete_capture(&record.path, false) {
                        Ok(()) => report.deleted.push(record.id),
                        Err(e) => {
                            warn!(capture_id = %record.id, error = %e, "Failed to delete remote capture");
                            report.abandoned.push(record.id);
                        }
                    }
                } else {
                    warn!(
                        capture_id = %record.id,
                        host = %env.host_name,
                        path = %record.path.display(),
                        "Leaving capture in the remote temporary folder"
                    );
                    report.abandoned.push(record.id);
                }
                continue;
            }

            match remove_local(&record.path) {
                Ok(()) => report.deleted.push(record.id),
                Err(e) => {
                    warn!(capture_id = %record.id, error = %e, "Failed to delete local capture");
                    report.abandoned.push(record.id);
                }
            }
        }

        info!(
            deleted = report.deleted.len(),
            handed_off = report.handed_off.len(),
            abandoned = report.abandoned.len(),
            "Captures cleaned up"
        );
        report
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Removes a local file; an already missing file counts as removed.
fn remove_local(path: &Path) -> Result<(), LiveError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LiveError::storage(path, e)),
    }
}
