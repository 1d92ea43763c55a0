//! Messages received from a target connection.

use std::path::PathBuf;

use rdlive_core::{CaptureId, Thumbnail};
use serde::{Deserialize, Serialize};

/// Metadata of a capture announced by the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCapture {
    /// Capture ID, unique within this connection
    pub id: CaptureId,

    /// Seconds since the Unix epoch
    pub timestamp: u64,

    /// Optional RGB8 thumbnail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,

    /// Where the capture file is stored
    pub path: PathBuf,

    /// Whether `path` is on the machine running the UI
    #[serde(default = "default_local")]
    pub local: bool,
}

fn default_local() -> bool {
    true
}

/// One update received from the target.
///
/// `Noop` is returned when the receive timed out with nothing to report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetMessage {
    /// Nothing arrived before the receive timeout
    Noop,

    /// Target name/PID/API changed (typically an API was registered)
    InfoUpdated {
        /// Newly registered API name
        api: String,
    },

    /// A new capture exists on the target
    NewCapture(NewCapture),

    /// A requested copy of a capture completed
    CaptureCopied {
        /// ID of the copied capture
        id: CaptureId,
        /// Local path the capture was copied to
        path: PathBuf,
    },

    /// The target spawned a child process that can be connected to
    NewChild {
        /// OS process ID of the child
        pid: u32,
        /// Target-control identifier of the child
        ident: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_tagging() {
        let msg: TargetMessage =
            serde_json::from_str(r#"{"type":"new_child","pid":1234,"ident":38921}"#).unwrap();
        assert_eq!(msg, TargetMessage::NewChild { pid: 1234, ident: 38921 });

        let msg: TargetMessage = serde_json::from_str(r#"{"type":"noop"}"#).unwrap();
        assert_eq!(msg, TargetMessage::Noop);
    }

    #[test]
    fn test_new_capture_defaults_to_local() {
        let msg: TargetMessage = serde_json::from_str(
            r#"{"type":"new_capture","id":7,"timestamp":1700000000,"path":"/tmp/a.rdc"}"#,
        )
        .unwrap();

        match msg {
            TargetMessage::NewCapture(capture) => {
                assert_eq!(capture.id, CaptureId::new(7));
                assert!(capture.local);
                assert!(capture.thumbnail.is_none());
            }
            other => panic!("expected new_capture, got {other:?}"),
        }
    }
}
