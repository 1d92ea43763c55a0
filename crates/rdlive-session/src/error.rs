//! Errors surfaced by live capture sessions.
//!
//! Errors raised on the poller thread never cross into the UI as values of
//! this type directly; they are converted to `SessionEvent::Closed` first.
//! Errors from UI-side calls (save, open, delete) are returned to the caller
//! and leave ledger state untouched.

use std::io;
use std::path::PathBuf;

use rdlive_core::CaptureId;
use thiserror::Error;

/// Errors that can occur while driving a live session.
#[derive(Debug, Error)]
pub enum LiveError {
    /// The initial connection could not be established.
    ///
    /// Terminal for the session. Reported once, never retried.
    #[error("connection to {host} (ident {ident}) failed: {reason}")]
    ConnectionFailed {
        host: String,
        ident: u32,
        reason: String,
    },

    /// The connection dropped mid-session with a protocol error.
    #[error("connection lost: {0}")]
    UnexpectedDisconnect(String),

    /// A remote capture needs a replay context on its host, and none is
    /// connected.
    #[error("capture is on remote host {host} and there is no active replay context on that host")]
    NoReplayContext { host: String },

    /// A local file copy or delete failed.
    #[error("storage failure at {path}: {source}")]
    StorageFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No capture with this ID exists in the session.
    #[error("capture {0} not found")]
    CaptureNotFound(CaptureId),

    /// The capture is still being copied through the live connection.
    #[error("capture {0} is still being copied")]
    CaptureBusy(CaptureId),

    /// The operation needs a file on this machine.
    #[error("capture {0} is on a remote host")]
    RemoteCapture(CaptureId),

    /// The session no longer has a live connection.
    #[error("session is not connected")]
    SessionClosed,
}

impl LiveError {
    /// Creates a storage failure for `path`.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::StorageFailure {
            path: path.into(),
            source,
        }
    }

    /// Dialog title used when the error is shown to the user.
    pub fn title(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "Connection failed",
            Self::UnexpectedDisconnect(_) => "Connection lost",
            Self::NoReplayContext { .. } => "No active replay context",
            Self::StorageFailure { .. } => "Cannot save",
            Self::CaptureNotFound(_) => "Unknown capture",
            Self::CaptureBusy(_) => "Capture busy",
            Self::RemoteCapture(_) => "Cannot open new instance",
            Self::SessionClosed => "Not connected",
        }
    }
}
