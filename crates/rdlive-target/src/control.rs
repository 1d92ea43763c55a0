//! The connection contract consumed by the session poller.

use std::path::Path;

use rdlive_core::{CaptureId, TargetInfo};

use crate::error::TargetError;
use crate::message::TargetMessage;

/// One open connection to an instrumented target process.
///
/// All calls are blocking. The connection is owned by exactly one poller
/// thread for its whole lifetime, so implementations only need `Send`.
pub trait TargetControl: Send {
    /// Whether the connection is still alive.
    fn connected(&self) -> bool;

    /// Current target name, API and PID.
    fn info(&self) -> TargetInfo;

    /// Blocks until the next update arrives or the connection's own receive
    /// timeout elapses (returning `TargetMessage::Noop`).
    fn receive_message(&mut self) -> Result<TargetMessage, TargetError>;

    /// Captures the next `num_frames` frames.
    fn trigger_capture(&mut self, num_frames: u32) -> Result<(), TargetError>;

    /// Captures when the target reaches `frame_number`.
    fn queue_capture(&mut self, frame_number: u32) -> Result<(), TargetError>;

    /// Copies a capture to `local_path` on the UI machine. Completion is
    /// reported later as `TargetMessage::CaptureCopied`.
    fn copy_capture(&mut self, id: CaptureId, local_path: &Path) -> Result<(), TargetError>;

    /// Deletes the temporary file of a capture.
    fn delete_capture(&mut self, id: CaptureId) -> Result<(), TargetError>;

    /// Closes the connection.
    fn shutdown(&mut self);
}

/// Opens target connections.
pub trait TargetConnector: Send + Sync {
    /// Connects to target `ident` on `host` (empty for the local machine).
    fn connect(
        &self,
        host: &str,
        ident: u32,
        username: &str,
    ) -> Result<Box<dyn TargetControl>, TargetError>;
}
