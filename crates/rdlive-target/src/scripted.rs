//! Scripted target - a deterministic `TargetControl` driven by JSON.
//!
//! A script lists the steps the target plays back, one per
//! `receive_message` call:
//!
//! ```json
//! {
//!   "target": "game.exe",
//!   "api": "Vulkan",
//!   "pid": 4120,
//!   "steps": [
//!     { "step": "message", "message": { "type": "new_capture", "id": 1,
//!       "timestamp": 1700000000, "path": "/tmp/game_1.rdc" } },
//!     { "step": "wait", "ms": 50 },
//!     { "step": "disconnect" }
//!   ],
//!   "on_end": "disconnect"
//! }
//! ```
//!
//! Every call the session makes into the target is recorded as a
//! `TargetCall` and can be inspected through the `ScriptControl` handle,
//! which can also push more steps while the connection is open.
//!
//! # Panic-Free Guarantees
//!
//! A poisoned state lock is recovered rather than unwrapped, so a panic in
//! one test thread never cascades into the poller.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use rdlive_core::{CaptureId, TargetInfo};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::control::{TargetConnector, TargetControl};
use crate::error::TargetError;
use crate::message::TargetMessage;

/// Receive timeout used when a script has nothing left to play.
const DEFAULT_IDLE_MS: u64 = 10;

// ============================================================================
// Script Format
// ============================================================================

/// One step played back by a scripted target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Deliver a message from `receive_message`
    Message { message: TargetMessage },

    /// Block for `ms` milliseconds, then deliver `Noop`
    Wait { ms: u64 },

    /// Break the connection with a protocol error
    Fail { reason: String },

    /// Close the connection cleanly (the target process exited)
    Disconnect,
}

/// What happens once every step has been played.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptEnd {
    /// The target exits
    #[default]
    Disconnect,

    /// The target stays connected and idles
    HoldOpen,
}

/// A complete target script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetScript {
    /// Executable name reported by the target
    pub target: String,

    #[serde(default)]
    pub api: String,

    #[serde(default)]
    pub pid: u32,

    /// False makes every connection attempt fail
    #[serde(default = "default_true")]
    pub reachable: bool,

    /// Answer each copy request with a `capture_copied` message
    #[serde(default = "default_true")]
    pub acknowledge_copies: bool,

    /// Receive timeout when idling (ms), unset to let the runner choose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_ms: Option<u64>,

    #[serde(default)]
    pub steps: Vec<ScriptStep>,

    #[serde(default)]
    pub on_end: ScriptEnd,
}

fn default_true() -> bool {
    true
}


impl TargetScript {
    /// Creates an empty script for a reachable target that exits at once.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            api: String::new(),
            pid: 0,
            reachable: true,
            acknowledge_copies: true,
            idle_ms: None,
            steps: Vec::new(),
            on_end: ScriptEnd::Disconnect,
        }
    }

    #[must_use]
    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        self.api = api.into();
        self
    }

    #[must_use]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    #[must_use]
    pub fn with_idle_ms(mut self, idle_ms: u64) -> Self {
        self.idle_ms = Some(idle_ms);
        self
    }

    /// Uses `idle_ms` unless the script sets its own receive timeout.
    #[must_use]
    pub fn or_idle_ms(mut self, idle_ms: u64) -> Self {
        self.idle_ms.get_or_insert(idle_ms);
        self
    }

    #[must_use]
    pub fn hold_open(mut self) -> Self {
        self.on_end = ScriptEnd::HoldOpen;
        self
    }

    #[must_use]
    pub fn step(mut self, step: ScriptStep) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn message(self, message: TargetMessage) -> Self {
        self.step(ScriptStep::Message { message })
    }

    /// Parses a script from JSON text.
    pub fn from_json(json: &str) -> Result<Self, TargetError> {
        serde_json::from_str(json).map_err(|e| TargetError::Script(e.to_string()))
    }

    /// Reads and parses a script file.
    pub fn load(path: &Path) -> Result<Self, TargetError> {
        let content = fs::read_to_string(path)
            .map_err(|e| TargetError::Script(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }
}

// ============================================================================
// Call Recording
// ============================================================================

/// A call made into a scripted target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum TargetCall {
    Connect {
        host: String,
        ident: u32,
        username: String,
    },
    TriggerCapture {
        num_frames: u32,
    },
    QueueCapture {
        frame_number: u32,
    },
    CopyCapture {
        id: CaptureId,
        path: PathBuf,
    },
    DeleteCapture {
        id: CaptureId,
    },
    Shutdown,
}

/// Mutable state shared between the target and its control handle.
#[derive(Debug)]
struct ScriptState {
    info: TargetInfo,
    reachable: bool,
    acknowledge_copies: bool,
    idle: Duration,
    on_end: ScriptEnd,
    steps: VecDeque<ScriptStep>,
    connected: bool,
    calls: Vec<TargetCall>,
}

type SharedState = Arc<Mutex<ScriptState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ScriptState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handle for inspecting and steering a scripted target from outside.
#[derive(Debug, Clone)]
pub struct ScriptControl {
    state: SharedState,
}

impl ScriptControl {
    /// Appends a step to the script.
    pub fn push(&self, step: ScriptStep) {
        lock(&self.state).steps.push_back(step);
    }

    /// Makes the target exit after the remaining steps.
    pub fn finish(&self) {
        let mut state = lock(&self.state);
        state.on_end = ScriptEnd::Disconnect;
    }

    /// Returns every call recorded so far.
    pub fn calls(&self) -> Vec<TargetCall> {
        lock(&self.state).calls.clone()
    }

    /// Returns true while the scripted connection is open.
    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

// ============================================================================
// Connector
// ============================================================================

/// `TargetConnector` that hands out one scripted connection.
///
/// All connections share the script's state; a test normally connects once.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    state: SharedState,
}

impl ScriptedConnector {
    /// Creates a connector and the handle to steer it.
    pub fn new(script: TargetScript) -> (Self, ScriptControl) {
        let state = Arc::new(Mutex::new(ScriptState {
            info: TargetInfo::new(script.target, script.api, script.pid),
            reachable: script.reachable,
            acknowledge_copies: script.acknowledge_copies,
            idle: Duration::from_millis(script.idle_ms.unwrap_or(DEFAULT_IDLE_MS)),
            on_end: script.on_end,
            steps: script.steps.into(),
            connected: false,
            calls: Vec::new(),
        }));

        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptControl { state },
        )
    }
}

impl TargetConnector for ScriptedConnector {
    fn connect(
        &self,
        host: &str,
        ident: u32,
        username: &str,
    ) -> Result<Box<dyn TargetControl>, TargetError> {
        let mut state = lock(&self.state);
        state.calls.push(TargetCall::Connect {
            host: host.to_string(),
            ident,
            username: username.to_string(),
        });

        if !state.reachable {
            return Err(TargetError::Unreachable {
                host: host.to_string(),
                ident,
                reason: "connection refused".to_string(),
            });
        }

        state.connected = true;
        info!(host = %host, ident, target = %state.info.target, "Scripted target connected");

        Ok(Box::new(ScriptedTarget {
            state: Arc::clone(&self.state),
        }))
    }
}

// ============================================================================
// Target
// ============================================================================

/// One scripted connection.
#[derive(Debug)]
pub struct ScriptedTarget {
    state: SharedState,
}

/// What `receive_message` does after releasing the lock.
enum Next {
    Deliver(TargetMessage),
    Sleep(Duration),
    Fail(String),
}

impl ScriptedTarget {
    fn record(&self, call: TargetCall) -> Result<(), TargetError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(TargetError::protocol("connection closed"));
        }
        state.calls.push(call);
        Ok(())
    }
}

impl TargetControl for ScriptedTarget {
    fn connected(&self) -> bool {
        lock(&self.state).connected
    }

    fn info(&self) -> TargetInfo {
        lock(&self.state).info.clone()
    }

    fn receive_message(&mut self) -> Result<TargetMessage, TargetError> {
        let next = {
            let mut state = lock(&self.state);
            if !state.connected {
                return Err(TargetError::protocol("connection closed"));
            }

            match state.steps.pop_front() {
                Some(ScriptStep::Message { message }) => {
                    if let TargetMessage::InfoUpdated { api } = &message {
                        state.info.api = api.clone();
                    }
                    Next::Deliver(message)
                }
                Some(ScriptStep::Wait { ms }) => Next::Sleep(Duration::from_millis(ms)),
                Some(ScriptStep::Fail { reason }) => {
                    state.connected = false;
                    Next::Fail(reason)
                }
                Some(ScriptStep::Disconnect) => {
                    state.connected = false;
                    Next::Deliver(TargetMessage::Noop)
                }
                None => match state.on_end {
                    ScriptEnd::HoldOpen => Next::Sleep(state.idle),
                    ScriptEnd::Disconnect => {
                        debug!(target_name = %state.info.target, "Script exhausted, target exiting");
                        state.connected = false;
                        Next::Deliver(TargetMessage::Noop)
                    }
                },
            }
        };

        match next {
            Next::Deliver(message) => Ok(message),
            Next::Sleep(duration) => {
                thread::sleep(duration);
                Ok(TargetMessage::Noop)
            }
            Next::Fail(reason) => Err(TargetError::Protocol(reason)),
        }
    }

    fn trigger_capture(&mut self, num_frames: u32) -> Result<(), TargetError> {
        self.record(TargetCall::TriggerCapture { num_frames })
    }

    fn queue_capture(&mut self, frame_number: u32) -> Result<(), TargetError> {
        self.record(TargetCall::QueueCapture { frame_number })
    }

    fn copy_capture(&mut self, id: CaptureId, local_path: &Path) -> Result<(), TargetError> {
        self.record(TargetCall::CopyCapture {
            id,
            path: local_path.to_path_buf(),
        })?;

        let mut state = lock(&self.state);
        if state.acknowledge_copies {
            state.steps.push_front(ScriptStep::Message {
                message: TargetMessage::CaptureCopied {
                    id,
                    path: local_path.to_path_buf(),
                },
            });
        }
        Ok(())
    }

    fn delete_capture(&mut self, id: CaptureId) -> Result<(), TargetError> {
        self.record(TargetCall::DeleteCapture { id })
    }

    fn shutdown(&mut self) {
        let mut state = lock(&self.state);
        state.calls.push(TargetCall::Shutdown);
        state.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::NewCapture;

    fn connect(script: TargetScript) -> (Box<dyn TargetControl>, ScriptControl) {
        let (connector, control) = ScriptedConnector::new(script);
        let target = connector.connect("", 38920, "tester").unwrap();
        (target, control)
    }

    #[test]
    fn test_unreachable_script_fails_connect() {
        let (connector, control) = ScriptedConnector::new(TargetScript::new("game.exe").unreachable());
        let result = connector.connect("devbox", 1, "tester");

        assert!(matches!(result, Err(TargetError::Unreachable { .. })));
        assert_eq!(control.calls().len(), 1);
        assert!(!control.is_connected());
    }

    #[test]
    fn test_steps_play_in_order_then_disconnect() {
        let script = TargetScript::new("game.exe")
            .with_pid(4120)
            .message(TargetMessage::InfoUpdated {
                api: "D3D11".to_string(),
            })
            .message(TargetMessage::NewChild { pid: 9, ident: 2 });
        let (mut target, _control) = connect(script);

        assert_eq!(
            target.receive_message().unwrap(),
            TargetMessage::InfoUpdated {
                api: "D3D11".to_string()
            }
        );
        assert_eq!(target.info().api, "D3D11");
        assert_eq!(
            target.receive_message().unwrap(),
            TargetMessage::NewChild { pid: 9, ident: 2 }
        );

        assert!(target.connected());
        assert_eq!(target.receive_message().unwrap(), TargetMessage::Noop);
        assert!(!target.connected());
    }

    #[test]
    fn test_fail_step_is_protocol_error() {
        let script = TargetScript::new("game.exe").step(ScriptStep::Fail {
            reason: "socket reset".to_string(),
        });
        let (mut target, _control) = connect(script);

        let err = target.receive_message().unwrap_err();
        assert_eq!(err, TargetError::Protocol("socket reset".to_string()));
        assert!(!target.connected());
    }

    #[test]
    fn test_hold_open_idles() {
        let script = TargetScript::new("game.exe").hold_open().with_idle_ms(1);
        let (mut target, control) = connect(script);

        for _ in 0..3 {
            assert_eq!(target.receive_message().unwrap(), TargetMessage::Noop);
        }
        assert!(target.connected());

        control.finish();
        target.receive_message().unwrap();
        assert!(!target.connected());
    }

    #[test]
    fn test_copy_is_acknowledged_and_recorded() {
        let (mut target, control) = connect(TargetScript::new("game.exe").hold_open());
        let dest = PathBuf::from("/captures/saved.rdc");

        target.copy_capture(CaptureId::new(3), &dest).unwrap();
        assert_eq!(
            target.receive_message().unwrap(),
            TargetMessage::CaptureCopied {
                id: CaptureId::new(3),
                path: dest.clone()
            }
        );

        target.delete_capture(CaptureId::new(4)).unwrap();
        target.shutdown();

        let calls = control.calls();
        assert!(calls.contains(&TargetCall::CopyCapture {
            id: CaptureId::new(3),
            path: dest
        }));
        assert!(calls.contains(&TargetCall::DeleteCapture {
            id: CaptureId::new(4)
        }));
        assert_eq!(calls.last(), Some(&TargetCall::Shutdown));
    }

    #[test]
    fn test_calls_after_shutdown_fail() {
        let (mut target, _control) = connect(TargetScript::new("game.exe").hold_open());
        target.shutdown();
        assert!(target.trigger_capture(1).is_err());
    }

    #[test]
    fn test_script_idle_defaults_to_runner_value() {
        let unset = TargetScript::from_json(r#"{ "target": "game.exe" }"#).unwrap();
        assert_eq!(unset.idle_ms, None);
        assert_eq!(unset.or_idle_ms(25).idle_ms, Some(25));

        let set = TargetScript::from_json(r#"{ "target": "game.exe", "idle_ms": 3 }"#).unwrap();
        assert_eq!(set.or_idle_ms(25).idle_ms, Some(3));
    }

    #[test]
    fn test_script_from_json() {
        let script = TargetScript::from_json(
            r#"{
                "target": "game.exe",
                "pid": 4120,
                "steps": [
                    { "step": "message", "message": { "type": "new_capture", "id": 1,
                      "timestamp": 1700000000, "path": "/tmp/game_1.rdc", "local": false } },
                    { "step": "wait", "ms": 5 }
                ],
                "on_end": "hold_open"
            }"#,
        )
        .unwrap();

        assert!(script.reachable);
        assert!(script.acknowledge_copies);
        assert_eq!(script.on_end, ScriptEnd::HoldOpen);
        assert_eq!(
            script.steps[0],
            ScriptStep::Message {
                message: TargetMessage::NewCapture(NewCapture {
                    id: CaptureId::new(1),
                    timestamp: 1_700_000_000,
                    thumbnail: None,
                    path: PathBuf::from("/tmp/game_1.rdc"),
                    local: false,
                })
            }
        );

        assert!(matches!(
            TargetScript::from_json("{ not json"),
            Err(TargetError::Script(_))
        ));
    }
}
