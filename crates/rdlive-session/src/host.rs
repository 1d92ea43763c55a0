//! Collaborators the session calls back into.
//!
//! `SessionHost` is the UI shell around a session: prompts, the currently
//! loaded capture, and the recent files list. `ReplayContext` is the
//! replay engine's connection to a host, used to reach remote capture
//! files once the live connection is gone.

use std::io;
use std::path::{Path, PathBuf};

use rdlive_core::CaptureRecord;

use crate::error::LiveError;

/// Answer to a yes/no/cancel question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Yes,
    No,
    Cancel,
}

/// The UI shell hosting a session.
pub trait SessionHost: Send {
    /// Loads a capture for inspection.
    fn load_capture(&mut self, path: &Path, temporary: bool, local: bool);

    /// Unloads the current capture.
    fn close_capture(&mut self);

    /// Path of the capture currently loaded, if any.
    fn current_capture_path(&self) -> Option<PathBuf>;

    /// Takes over disposal of the currently loaded temporary capture.
    fn take_capture_ownership(&mut self);

    /// Asks where to save a capture. `None` cancels the save.
    fn choose_save_path(&mut self, record: &CaptureRecord) -> Option<PathBuf>;

    /// "Save this capture?" on close.
    fn prompt_unsaved(&mut self, record: &CaptureRecord) -> PromptAnswer;

    /// Asks whether to leave remote captures behind when they cannot be
    /// saved or deleted. `saving` tells which action was impossible.
    fn prompt_abandon_remote(&mut self, host: &str, record: &CaptureRecord, saving: bool) -> bool;

    /// Confirms deleting `count` captures, at least one of them unsaved.
    fn confirm_delete(&mut self, count: usize) -> bool;

    fn report_error(&mut self, error: &LiveError);

    /// Opens a new live session window.
    fn open_live_session(&mut self, host: &str, ident: u32);

    fn add_recent_file(&mut self, path: &Path);

    /// Starts a new application instance on a temporary capture copy.
    fn launch_new_instance(&mut self, path: &Path) -> io::Result<()>;
}

/// Replay engine access to capture files on a host.
pub trait ReplayContext: Send {
    /// Whether a replay context is currently connected to `host`.
    fn is_connected_to(&self, host: &str) -> bool;

    /// Copies a capture from the remote host to `local`.
    fn copy_capture_from_remote(&mut self, remote: &Path, local: &Path) -> io::Result<()>;

    /// Deletes a capture file, local or on the connected remote host.
    fn delete_capture(&mut self, path: &Path, local: bool) -> io::Result<()>;
}

/// `ReplayContext` for a UI with no replay engine attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReplay;

impl ReplayContext for NoReplay {
    fn is_connected_to(&self, _host: &str) -> bool {
        false
    }

    fn copy_capture_from_remote(&mut self, _remote: &Path, _local: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::NotConnected,
            "no replay context",
        ))
    }

    fn delete_capture(&mut self, path: &Path, local: bool) -> io::Result<()> {
        if local {
            std::fs::remove_file(path)
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no replay context",
            ))
        }
    }
}
