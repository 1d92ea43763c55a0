//! Poller → UI notifications.

use std::fmt;
use std::path::PathBuf;

use rdlive_core::{CaptureId, CaptureRecord, ChildProcessRecord, TargetInfo};
use serde::Serialize;

use crate::error::LiveError;

/// Why the poller stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum CloseReason {
    /// The initial connection could not be established
    ConnectFailed(String),

    /// The UI asked the poller to disconnect
    Requested,

    /// The connection reported it is no longer connected
    TargetExited,

    /// The connection broke with a protocol error
    Lost(String),
}

impl CloseReason {
    /// Returns true for the failed terminal state.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ConnectFailed(_))
    }

    /// Status line shown once the connection is gone.
    pub fn status_text(&self) -> String {
        match self {
            Self::ConnectFailed(_) => "Connection failed".to_string(),
            Self::Requested | Self::TargetExited => "Connection closed".to_string(),
            Self::Lost(reason) => format!("Connection lost: {reason}"),
        }
    }

    /// Error describing an abnormal close, `None` for a normal one.
    pub fn to_error(&self, host: &str, ident: u32) -> Option<LiveError> {
        match self {
            Self::ConnectFailed(reason) => Some(LiveError::ConnectionFailed {
                host: host.to_string(),
                ident,
                reason: reason.clone(),
            }),
            Self::Lost(reason) => Some(LiveError::UnexpectedDisconnect(reason.clone())),
            Self::Requested | Self::TargetExited => None,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed(reason) => write!(f, "connect failed: {reason}"),
            Self::Requested => write!(f, "requested"),
            Self::TargetExited => write!(f, "target exited"),
            Self::Lost(reason) => write!(f, "lost: {reason}"),
        }
    }
}

/// Notifications published by the poller, in the order observed.
///
/// Every poller publishes exactly one `Closed`, and it is always last.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Connection established
    Connected(TargetInfo),

    /// Target name/PID/API changed
    Renamed(TargetInfo),

    /// A new capture exists
    CaptureAdded(CaptureRecord),

    /// A copy requested through the connection finished
    CaptureCopied { id: CaptureId, path: PathBuf },

    /// A child process was spawned and is still alive
    ChildAdded(ChildProcessRecord),

    /// The poller stopped
    Closed(CloseReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_status_text() {
        assert_eq!(
            CloseReason::ConnectFailed("refused".into()).status_text(),
            "Connection failed"
        );
        assert_eq!(CloseReason::TargetExited.status_text(), "Connection closed");
        assert_eq!(
            CloseReason::Lost("socket reset".into()).status_text(),
            "Connection lost: socket reset"
        );
    }

    #[test]
    fn test_close_reason_errors() {
        assert!(CloseReason::Requested.to_error("", 1).is_none());
        assert!(matches!(
            CloseReason::Lost("x".into()).to_error("", 1),
            Some(LiveError::UnexpectedDisconnect(_))
        ));
        assert!(matches!(
            CloseReason::ConnectFailed("x".into()).to_error("devbox", 1),
            Some(LiveError::ConnectionFailed { ident: 1, .. })
        ));
        assert!(CloseReason::ConnectFailed("x".into()).is_failure());
    }
}
