//! Session poller - the one background thread per session that talks to
//! the target connection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  PollerRequest   ┌───────────────┐  TargetControl  ┌────────┐
//! │  Session /   │─────────────────▶│ SessionPoller │────────────────▶│ Target │
//! │  UI loop     │  (mpsc, drained) │ (blocking     │◀────────────────│        │
//! │              │◀─────────────────│  thread)      │ receive_message └────────┘
//! └──────────────┘  SessionEvent    └───────────────┘
//!                   (mpsc, single consumer)
//! ```
//!
//! Each iteration:
//! 1. block in `receive_message` (the only blocking point)
//! 2. drain requests and issue them: trigger, queue, copy, delete
//! 3. if a disconnect was requested, drain once more, shut down, stop
//! 4. publish whatever the received message reported
//!
//! The connection is owned by the poller thread for its whole lifetime. The
//! poller never touches UI state; it only publishes `SessionEvent`s, ending
//! with exactly one `SessionEvent::Closed`.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()` in the loop
//! - Connection errors become a `CloseReason`, never a panic or an `Err`
//!   escaping the thread
//! - Event send failures (UI gone) are ignored

use std::sync::Arc;

use rdlive_core::{CaptureRecord, ChildProcessRecord};
use rdlive_target::{TargetConnector, TargetControl, TargetMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::process::ProcessTable;

mod events;
mod requests;

pub use events::{CloseReason, SessionEvent};
pub use requests::{PollerRequest, RequestBatch, RequestHandle};

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Target host, empty for the local machine
    pub host: String,

    /// Target-control identifier on that host
    pub ident: u32,

    /// User name announced to the target
    pub username: String,
}

/// Channels and task handle returned by `spawn_poller`.
pub struct PollerHandle {
    /// Request sender, clonable
    pub requests: RequestHandle,

    /// Single-consumer event stream
    pub events: mpsc::UnboundedReceiver<SessionEvent>,

    /// Signals the poller to disconnect
    pub cancel: CancellationToken,

    /// Resolves to the close reason once the thread exits
    pub task: JoinHandle<CloseReason>,
}

/// Spawns a poller on a dedicated blocking thread.
///
/// Must be called from within a tokio runtime.
pub fn spawn_poller(
    params: ConnectParams,
    connector: Arc<dyn TargetConnector>,
    processes: Arc<dyn ProcessTable>,
) -> PollerHandle {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let poller = SessionPoller::new(
        params,
        connector,
        processes,
        request_rx,
        event_tx,
        cancel.clone(),
    );
    let task = tokio::task::spawn_blocking(move || poller.run());

    PollerHandle {
        requests: RequestHandle::new(request_tx),
        events: event_rx,
        cancel,
        task,
    }
}

// ============================================================================
// Session Poller
// ============================================================================

/// Owns one target connection and runs the poll loop against it.
pub struct SessionPoller {
    params: ConnectParams,
    connector: Arc<dyn TargetConnector>,
    processes: Arc<dyn ProcessTable>,
    requests: mpsc::UnboundedReceiver<PollerRequest>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
}

impl SessionPoller {
    pub fn new(
        params: ConnectParams,
        connector: Arc<dyn TargetConnector>,
        processes: Arc<dyn ProcessTable>,
        requests: mpsc::UnboundedReceiver<PollerRequest>,
        events: mpsc::UnboundedSender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            params,
            connector,
            processes,
            requests,
            events,
            cancel,
        }
    }

    /// Connects, polls until the connection ends, and publishes `Closed`.
    ///
    /// Blocking: call on a dedicated thread.
    pub fn run(mut self) -> CloseReason {
        let host = self.params.host.clone();
        let ident = self.params.ident;

        info!(host = %host, ident, "Connecting to target");

        let reason = match self
            .connector
            .connect(&host, ident, &self.params.username)
        {
            Ok(mut connection) if connection.connected() => {
                let target = connection.info();
                info!(host = %host, ident, target = %target.target, pid = target.pid, "Connected to target");
                self.publish(SessionEvent::Connected(target));
                self.poll(connection.as_mut())
            }
            Ok(_) => {
                warn!(host = %host, ident, "Target closed the connection during handshake");
                CloseReason::ConnectFailed("connection closed during handshake".to_string())
            }
            Err(e) => {
                warn!(host = %host, ident, error = %e, "Failed to connect to target");
                CloseReason::ConnectFailed(e.to_string())
            }
        };

        info!(host = %host, ident, reason = %reason, "Poller stopped");
        self.publish(SessionEvent::Closed(reason.clone()));
        reason
    }

    fn poll(&mut self, connection: &mut dyn TargetControl) -> CloseReason {
        loop {
            if !connection.connected() {
                return CloseReason::TargetExited;
            }

            let message = match connection.receive_message() {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Connection lost");
                    return CloseReason::Lost(e.to_string());
                }
            };

            let (batch, requests_closed) = RequestBatch::drain(&mut self.requests);
            if let Err(e) = batch.issue(connection) {
                warn!(error = %e, "Request failed, connection lost");
                return CloseReason::Lost(e.to_string());
            }

            if self.cancel.is_cancelled() || requests_closed {
                return self.disconnect(connection);
            }

            self.dispatch(message, connection);
        }
    }

    /// Final drain then shutdown, so requests enqueued just before the
    /// disconnect signal still reach the target.
    fn disconnect(&mut self, connection: &mut dyn TargetControl) -> CloseReason {
        let (batch, _) = RequestBatch::drain(&mut self.requests);
        if !batch.is_empty() {
            debug!(deletes = batch.deletes.len(), "Issuing final requests before disconnect");
            if let Err(e) = batch.issue(connection) {
                warn!(error = %e, "Final requests failed");
            }
        }

        connection.shutdown();
        info!(host = %self.params.host, ident = self.params.ident, "Disconnected from target");
        CloseReason::Requested
    }

    fn dispatch(&self, message: TargetMessage, connection: &dyn TargetControl) {
        match message {
            TargetMessage::Noop => {}

            TargetMessage::InfoUpdated { api } => {
                debug!(api = %api, "Target info updated");
                self.publish(SessionEvent::Renamed(connection.info()));
            }

            TargetMessage::NewCapture(capture) => {
                let target = connection.info();
                let record = CaptureRecord::new(
                    capture.id,
                    target.target,
                    target.api,
                    CaptureRecord::timestamp_from_unix(capture.timestamp),
                    capture.path,
                    capture.local,
                )
                .with_thumbnail(capture.thumbnail);

                info!(capture_id = %record.id, local = record.local, path = %record.path.display(), "New capture");
                self.publish(SessionEvent::CaptureAdded(record));
            }

            TargetMessage::CaptureCopied { id, path } => {
                info!(capture_id = %id, path = %path.display(), "Capture copied");
                self.publish(SessionEvent::CaptureCopied { id, path });
            }

            TargetMessage::NewChild { pid, ident } => {
                if pid == 0 {
                    debug!(ident, "Ignoring child without a PID");
                    return;
                }

                match self.processes.name_of(pid) {
                    Some(name) => {
                        self.publish(SessionEvent::ChildAdded(ChildProcessRecord::new(
                            pid, ident, name,
                        )));
                    }
                    None => debug!(pid, ident, "Child exited before it could be resolved"),
                }
            }
        }
    }

    fn publish(&self, event: SessionEvent) {
        // The UI may already be gone
        let _ = self.events.send(event);
    }
}
