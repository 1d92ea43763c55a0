//! UI → poller requests.
//!
//! The UI side never calls into the connection. It sends `PollerRequest`s
//! through a `RequestHandle`, and the poller drains the channel once per
//! iteration into a `RequestBatch`, which coalesces and issues them in a
//! fixed order: trigger, queue, copy, delete.
//!
//! # Coalescing
//!
//! - Trigger and queue are last-writer-wins: one call per batch.
//! - Copies keep one destination per capture (last wins).
//! - Deletes keep every distinct ID once, in arrival order.
//!
//! # Panic-Free Guarantees
//!
//! Sending to a stopped poller returns `false` instead of failing.

use std::path::{Path, PathBuf};

use rdlive_core::CaptureId;
use rdlive_target::{TargetControl, TargetError};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

// ============================================================================
// Requests
// ============================================================================

/// A mutating request for the target connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerRequest {
    /// Capture the next `num_frames` frames
    TriggerCapture { num_frames: u32 },

    /// Capture at a specific frame number
    QueueCapture { frame_number: u32 },

    /// Copy a capture to a local path
    CopyCapture { id: CaptureId, path: PathBuf },

    /// Delete a capture's temporary file
    DeleteCapture { id: CaptureId },
}

/// Cheap-to-clone sender for poller requests.
///
/// Every clone feeds the same poller, so deletes may be enqueued from any
/// number of places.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    sender: mpsc::UnboundedSender<PollerRequest>,
}

impl RequestHandle {
    pub fn new(sender: mpsc::UnboundedSender<PollerRequest>) -> Self {
        Self { sender }
    }

    /// Sends a request. Returns false if the poller has stopped.
    pub fn send(&self, request: PollerRequest) -> bool {
        self.sender.send(request).is_ok()
    }

    pub fn trigger_capture(&self, num_frames: u32) -> bool {
        self.send(PollerRequest::TriggerCapture { num_frames })
    }

    pub fn queue_capture(&self, frame_number: u32) -> bool {
        self.send(PollerRequest::QueueCapture { frame_number })
    }

    pub fn copy_capture(&self, id: CaptureId, path: &Path) -> bool {
        self.send(PollerRequest::CopyCapture {
            id,
            path: path.to_path_buf(),
        })
    }

    pub fn delete_capture(&self, id: CaptureId) -> bool {
        self.send(PollerRequest::DeleteCapture { id })
    }

    /// Returns true while the poller is still receiving.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

// ============================================================================
// Request Batch
// ============================================================================

/// Requests drained in one poll iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestBatch {
    pub trigger: Option<u32>,
    pub queue: Option<u32>,
    pub copies: Vec<(CaptureId, PathBuf)>,
    pub deletes: Vec<CaptureId>,
}

impl RequestBatch {
    /// Drains every pending request without blocking.
    ///
    /// Also returns whether the channel is closed (every sender dropped).
    pub fn drain(receiver: &mut mpsc::UnboundedReceiver<PollerRequest>) -> (Self, bool) {
        let mut batch = Self::default();
        loop {
            match receiver.try_recv() {
                Ok(request) => batch.push(request),
                Err(TryRecvError::Empty) => return (batch, false),
                Err(TryRecvError::Disconnected) => return (batch, true),
            }
        }
    }

    /// Merges one request into the batch.
    pub fn push(&mut self, request: PollerRequest) {
        match request {
            PollerRequest::TriggerCapture { num_frames } => self.trigger = Some(num_frames),
            PollerRequest::QueueCapture { frame_number } => self.queue = Some(frame_number),
            PollerRequest::CopyCapture { id, path } => {
                match self.copies.iter_mut().find(|(existing, _)| *existing == id) {
                    Some(entry) => entry.1 = path,
                    None => self.copies.push((id, path)),
                }
            }
            PollerRequest::DeleteCapture { id } => {
                if !self.deletes.contains(&id) {
                    self.deletes.push(id);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trigger.is_none()
            && self.queue.is_none()
            && self.copies.is_empty()
            && self.deletes.is_empty()
    }

    /// Issues the batch against the connection in fixed order.
    ///
    /// Stops at the first failed call; the connection is broken by then.
    pub fn issue(self, connection: &mut dyn TargetControl) -> Result<(), TargetError> {
        if self.is_empty() {
            return Ok(());
        }

        if let Some(num_frames) = self.trigger {
            debug!(num_frames, "Triggering capture");
            connection.trigger_capture(num_frames)?;
        }

        if let Some(frame_number) = self.queue {
            debug!(frame_number, "Queueing capture");
            connection.queue_capture(frame_number)?;
        }

        for (id, path) in self.copies {
            debug!(capture_id = %id, path = %path.display(), "Copying capture");
            connection.copy_capture(id, &path)?;
        }

        for id in self.deletes {
            debug!(capture_id = %id, "Deleting capture");
            connection.delete_capture(id)?;
        }

        Ok(())
    }
}
