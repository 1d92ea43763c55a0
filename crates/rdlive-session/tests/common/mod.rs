//! Shared fakes for session integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rdlive_core::{CaptureId, CaptureRecord, LiveConfig};
use rdlive_session::{
    LiveError, ProcessTable, PromptAnswer, ReplayContext, Session, SessionDeps, SessionHost,
};
use rdlive_target::{
    NewCapture, ScriptControl, ScriptedConnector, TargetCall, TargetMessage, TargetScript,
};
use tokio::time::timeout;

/// Upper bound for any wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Fake Host
// ============================================================================

#[derive(Debug, Default)]
pub struct HostState {
    pub save_path: Option<PathBuf>,
    pub unsaved_answers: VecDeque<PromptAnswer>,
    pub abandon_remote: bool,
    pub confirm_delete: bool,

    pub current: Option<PathBuf>,
    pub loaded: Vec<(PathBuf, bool, bool)>,
    pub ownership_taken: usize,
    pub prompts: usize,
    pub errors: Vec<String>,
    pub live_sessions: Vec<(String, u32)>,
    pub recent: Vec<PathBuf>,
    pub launched: Vec<PathBuf>,
}

/// `SessionHost` whose state stays inspectable after the session took it.
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    pub state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut HostState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

impl SessionHost for FakeHost {
    fn load_capture(&mut self, path: &Path, temporary: bool, local: bool) {
        self.with(|s| {
            s.current = Some(path.to_path_buf());
            s.loaded.push((path.to_path_buf(), temporary, local));
        });
    }

    fn close_capture(&mut self) {
        self.with(|s| s.current = None);
    }

    fn current_capture_path(&self) -> Option<PathBuf> {
        self.state.lock().unwrap().current.clone()
    }

    fn take_capture_ownership(&mut self) {
        self.with(|s| s.ownership_taken += 1);
    }

    fn choose_save_path(&mut self, _record: &CaptureRecord) -> Option<PathBuf> {
        self.with(|s| s.save_path.clone())
    }

    fn prompt_unsaved(&mut self, _record: &CaptureRecord) -> PromptAnswer {
        self.with(|s| {
            s.prompts += 1;
            s.unsaved_answers.pop_front().unwrap_or(PromptAnswer::No)
        })
    }

    fn prompt_abandon_remote(&mut self, _host: &str, _record: &CaptureRecord, _saving: bool) -> bool {
        self.with(|s| s.abandon_remote)
    }

    fn confirm_delete(&mut self, _count: usize) -> bool {
        self.with(|s| s.confirm_delete)
    }

    fn report_error(&mut self, error: &LiveError) {
        self.with(|s| s.errors.push(error.to_string()));
    }

    fn open_live_session(&mut self, host: &str, ident: u32) {
        self.with(|s| s.live_sessions.push((host.to_string(), ident)));
    }

    fn add_recent_file(&mut self, path: &Path) {
        self.with(|s| s.recent.push(path.to_path_buf()));
    }

    fn launch_new_instance(&mut self, path: &Path) -> io::Result<()> {
        self.with(|s| s.launched.push(path.to_path_buf()));
        Ok(())
    }
}

// ============================================================================
// Fake Replay Context
// ============================================================================

#[derive(Debug, Default)]
pub struct ReplayState {
    pub connected_host: Option<String>,
    pub copies: Vec<(PathBuf, PathBuf)>,
    pub deletes: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeReplay {
    pub state: Arc<Mutex<ReplayState>>,
}

impl FakeReplay {
    pub fn connected_to(host: &str) -> Self {
        let replay = Self::default();
        replay.state.lock().unwrap().connected_host = Some(host.to_string());
        replay
    }

    pub fn disconnected() -> Self {
        Self::default()
    }
}

impl ReplayContext for FakeReplay {
    fn is_connected_to(&self, host: &str) -> bool {
        self.state.lock().unwrap().connected_host.as_deref() == Some(host)
    }

    fn copy_capture_from_remote(&mut self, remote: &Path, local: &Path) -> io::Result<()> {
        fs::write(local, b"RDOC")?;
        self.state
            .lock()
            .unwrap()
            .copies
            .push((remote.to_path_buf(), local.to_path_buf()));
        Ok(())
    }

    fn delete_capture(&mut self, path: &Path, _local: bool) -> io::Result<()> {
        self.state.lock().unwrap().deletes.push(path.to_path_buf());
        Ok(())
    }
}

// ============================================================================
// Fake Process Table
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct FakeProcesses {
    pub live: Arc<Mutex<HashMap<u32, String>>>,
}

impl FakeProcesses {
    pub fn with_live(pids: &[(u32, &str)]) -> Self {
        let table = Self::default();
        for (pid, name) in pids {
            table.live.lock().unwrap().insert(*pid, name.to_string());
        }
        table
    }

    pub fn kill(&self, pid: u32) {
        self.live.lock().unwrap().remove(&pid);
    }
}

impl ProcessTable for FakeProcesses {
    fn snapshot(&self) -> HashMap<u32, String> {
        self.live.lock().unwrap().clone()
    }
}

// ============================================================================
// Session Helpers
// ============================================================================

/// Config with short periods so tests run fast.
pub fn create_test_config(temp_dir: &Path) -> LiveConfig {
    LiveConfig {
        child_poll_interval_ms: 10,
        countdown_tick_ms: 10,
        shutdown_grace_ms: 2000,
        idle_poll_ms: 1,
        username: "tester".to_string(),
        temp_dir: temp_dir.to_path_buf(),
        recent_files_max: 10,
    }
}

/// Starts a session against a scripted target.
pub fn start_session(
    script: TargetScript,
    host_name: &str,
    host: &FakeHost,
    replay: &FakeReplay,
    processes: &FakeProcesses,
    temp_dir: &Path,
) -> (Session, ScriptControl) {
    let config = create_test_config(temp_dir);
    let (connector, control) = ScriptedConnector::new(script.or_idle_ms(config.idle_poll_ms));
    let deps = SessionDeps {
        connector: Arc::new(connector),
        processes: Arc::new(processes.clone()),
        host: Box::new(host.clone()),
        replay: Box::new(replay.clone()),
        config,
    };
    (Session::start(host_name, 38920, deps), control)
}

/// Script for a target that stays connected until closed.
pub fn idle_script() -> TargetScript {
    TargetScript::new("game.exe").with_api("Vulkan").with_pid(4120).hold_open()
}

pub fn new_capture(id: u32, path: &Path, local: bool) -> TargetMessage {
    TargetMessage::NewCapture(NewCapture {
        id: CaptureId::new(id),
        timestamp: 1_700_000_000,
        thumbnail: None,
        path: path.to_path_buf(),
        local,
    })
}

/// Writes a fake capture file.
pub fn write_capture(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"RDOC").unwrap();
    path
}

/// Applies events until `done` holds.
pub async fn pump_until(session: &mut Session, done: impl Fn(&Session) -> bool) {
    while !done(&*session) {
        let event = timeout(WAIT, session.next_event())
            .await
            .expect("timed out waiting for a session event")
            .expect("poller stopped before the condition held");
        session.handle_event(event).await;
    }
}

/// Waits until the scripted target has recorded `call`.
pub async fn wait_for_call(control: &ScriptControl, call: &TargetCall) {
    timeout(WAIT, async {
        while !control.calls().contains(call) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("timed out waiting for target call");
}
