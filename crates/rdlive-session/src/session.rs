//! Session - composition root for one live connection.
//!
//! A `Session` owns the poller, the capture ledger and the child tracker,
//! and is the control surface the UI talks to. All of its state is touched
//! only from the UI side; the poller reaches it exclusively through
//! `SessionEvent`s applied by `handle_event`.
//!
//! # State machine
//!
//! ```text
//! Connecting ──Connected──▶ Connected ──Closed──▶ Closed
//!     │
//!     └──────ConnectFailed──────────────────────▶ Failed
//! ```
//!
//! `finished` is separate from the state: a session whose connection closed
//! stays usable (save, open, delete) until it is closed itself, either by
//! the user through `request_close` or by the auto-close policy.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` outside tests
//! - A poller that overruns the shutdown grace period is detached, not
//!   waited on forever

use std::path::PathBuf;
use std::sync::Arc;

use rdlive_core::{CaptureId, CaptureRecord, ChildProcessRecord, LiveConfig, TargetInfo};
use rdlive_target::TargetConnector;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::children::{ChildTracker, ChildUpdate};
use crate::countdown::{Countdown, CountdownTick};
use crate::error::LiveError;
use crate::host::{ReplayContext, SessionHost};
use crate::ledger::{CaptureLedger, CleanupReport, LedgerEnv, SaveOutcome};
use crate::policy::{auto_close_policy, AutoClose};
use crate::poller::{spawn_poller, CloseReason, ConnectParams, RequestHandle, SessionEvent};
use crate::process::ProcessTable;

// ============================================================================
// State & Status
// ============================================================================

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The poller is establishing the connection
    Connecting,
    /// The connection is up
    Connected,
    /// The connection ended after being established
    Closed,
    /// The connection could never be established
    Failed,
}

/// Icon shown next to the status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusIcon {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

/// What the UI displays for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub title: String,
    pub text: String,
    pub icon: StatusIcon,
}

/// Everything a session needs from the outside.
pub struct SessionDeps {
    pub connector: Arc<dyn TargetConnector>,
    pub processes: Arc<dyn ProcessTable>,
    pub host: Box<dyn SessionHost>,
    pub replay: Box<dyn ReplayContext>,
    pub config: LiveConfig,
}

// ============================================================================
// Session
// ============================================================================

/// One live capture session.
pub struct Session {
    host_name: String,
    ident: u32,

    state: SessionState,
    status: SessionStatus,
    close_reason: Option<CloseReason>,
    connected: bool,
    finished: bool,

    ledger: CaptureLedger,
    children: ChildTracker,
    countdown: Option<Countdown>,

    requests: RequestHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    cancel: CancellationToken,
    poller: Option<JoinHandle<CloseReason>>,

    host: Box<dyn SessionHost>,
    replay: Box<dyn ReplayContext>,
    processes: Arc<dyn ProcessTable>,
    config: LiveConfig,
}

impl Session {
    /// Starts a session: spawns the poller, which connects to target
    /// `ident` on `host_name` (empty for the local machine).
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(host_name: impl Into<String>, ident: u32, deps: SessionDeps) -> Self {
        let host_name = host_name.into();

        let poller = spawn_poller(
            ConnectParams {
                host: host_name.clone(),
                ident,
                username: deps.config.username.clone(),
            },
            deps.connector,
            Arc::clone(&deps.processes),
        );

        info!(host = %host_name, ident, "Session started");

        let status = SessionStatus {
            title: with_host(&host_name, "Connecting..."),
            text: "Connecting...".to_string(),
            icon: StatusIcon::Connecting,
        };

        Self {
            host_name,
            ident,
            state: SessionState::Connecting,
            status,
            close_reason: None,
            connected: false,
            finished: false,
            ledger: CaptureLedger::new(),
            children: ChildTracker::new(),
            countdown: None,
            requests: poller.requests,
            events: poller.events,
            cancel: poller.cancel,
            poller: Some(poller.task),
            host: deps.host,
            replay: deps.replay,
            processes: deps.processes,
            config: deps.config,
        }
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn ident(&self) -> u32 {
        self.ident
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Returns true while the live connection is believed to be up.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns true once the session itself has closed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Why the connection ended, once it has.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// Error for an abnormal connection end.
    pub fn close_error(&self) -> Option<LiveError> {
        self.close_reason
            .as_ref()
            .and_then(|reason| reason.to_error(&self.host_name, self.ident))
    }

    pub fn captures(&self) -> &[CaptureRecord] {
        self.ledger.records()
    }

    pub fn capture(&self, id: CaptureId) -> Option<&CaptureRecord> {
        self.ledger.get(id)
    }

    pub fn children(&self) -> &[ChildProcessRecord] {
        self.children.children()
    }

    pub fn countdown(&self) -> Option<&Countdown> {
        self.countdown.as_ref()
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    /// Splits out the ledger and the collaborators its operations need.
    fn ledger_env(&mut self) -> (&mut CaptureLedger, LedgerEnv<'_>) {
        let requests = self.connected.then_some(&self.requests);
        (
            &mut self.ledger,
            LedgerEnv {
                host_name: &self.host_name,
                host: self.host.as_mut(),
                replay: self.replay.as_mut(),
                requests,
            },
        )
    }

    // ========================================================================
    // Capture Control
    // ========================================================================

    /// Captures when the target reaches `frame_number`.
    ///
    /// Repeated calls before the poller drains them collapse into one.
    pub fn queue_capture(&mut self, frame_number: u32) -> Result<(), LiveError> {
        if !self.connected || !self.requests.queue_capture(frame_number) {
            return Err(LiveError::SessionClosed);
        }
        debug!(frame_number, "Queue capture requested");
        Ok(())
    }

    /// Triggers a capture of `num_frames` frames, immediately or after a
    /// countdown of `delay_secs` ticks. Ignored while a countdown runs.
    pub fn trigger_capture(&mut self, delay_secs: u32, num_frames: u32) -> Result<(), LiveError> {
        if !self.connected {
            return Err(LiveError::SessionClosed);
        }
        if let Some(countdown) = &self.countdown {
            debug!(
                num_frames = countdown.num_frames(),
                remaining = countdown.remaining(),
                "Trigger countdown already running"
            );
            return Ok(());
        }

        match Countdown::start(delay_secs, num_frames) {
            Some(countdown) => {
                debug!(delay_secs, num_frames, "Trigger countdown started");
                self.countdown = Some(countdown);
                Ok(())
            }
            None => {
                if self.requests.trigger_capture(num_frames) {
                    Ok(())
                } else {
                    Err(LiveError::SessionClosed)
                }
            }
        }
    }

    /// Advances the trigger countdown by one tick.
    pub fn countdown_tick(&mut self) -> Option<CountdownTick> {
        let tick = self.countdown.as_mut()?.tick();

        if let CountdownTick::Fire { num_frames } = tick {
            self.countdown = None;
            if !self.requests.trigger_capture(num_frames) {
                warn!(num_frames, "Countdown fired after the poller stopped");
            }
        }
        Some(tick)
    }

    // ========================================================================
    // Capture Management
    // ========================================================================

    pub fn rename_capture(&mut self, id: CaptureId, name: impl Into<String>) -> Result<(), LiveError> {
        self.ledger.rename(id, name)
    }

    /// Saves a capture to a location chosen by the host.
    pub fn save_capture(&mut self, id: CaptureId) -> Result<SaveOutcome, LiveError> {
        let (ledger, mut env) = self.ledger_env();
        let result = ledger.save(id, &mut env);
        if let Err(e) = &result {
            env.host.report_error(e);
        }
        result
    }

    /// Loads a capture in the host.
    pub fn open_capture(&mut self, id: CaptureId) -> Result<(), LiveError> {
        let (ledger, mut env) = self.ledger_env();
        let result = ledger.open(id, &mut env);
        if let Err(e) = &result {
            env.host.report_error(e);
        }
        result
    }

    /// Opens a local capture in a new application instance.
    pub fn open_in_new_instance(&mut self, id: CaptureId) -> Result<PathBuf, LiveError> {
        let result = self
            .ledger
            .open_in_new_instance(id, &self.config.temp_dir, self.host.as_mut());
        if let Err(e) = &result {
            self.host.report_error(e);
        }
        result
    }

    /// Deletes captures, confirming once if any is unsaved.
    pub fn delete_captures(&mut self, ids: &[CaptureId]) -> usize {
        let (ledger, mut env) = self.ledger_env();
        ledger.delete_captures(ids, &mut env)
    }

    // ========================================================================
    // Children
    // ========================================================================

    /// Reconciles children against the OS process list.
    pub fn tick_children(&mut self) -> ChildUpdate {
        if self.children.is_empty() {
            return ChildUpdate::default();
        }
        let live = self.processes.snapshot();
        self.children.reconcile(&live)
    }

    /// Opens a new session against a surfaced child.
    pub fn open_child_session(&mut self, pid: u32) -> bool {
        match self.children.get(pid) {
            Some(child) if child.ident > 0 => {
                info!(pid, ident = child.ident, "Opening session on child process");
                self.host.open_live_session(&self.host_name, child.ident);
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Waits for the next poller notification. `None` once the poller has
    /// stopped and every notification was consumed.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Applies a poller notification, running the auto-close policy when
    /// the connection ends on its own.
    pub async fn handle_event(&mut self, event: SessionEvent) {
        if self.apply_event(event) {
            self.apply_close_policy().await;
        }
    }

    /// Returns true when the close policy should run.
    fn apply_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Connected(target) => {
                self.state = SessionState::Connected;
                self.connected = true;
                self.set_connected_status(&target);
            }
            SessionEvent::Renamed(target) => self.set_connected_status(&target),
            SessionEvent::CaptureAdded(record) => self.ledger.add(record),
            SessionEvent::CaptureCopied { id, path } => {
                self.ledger.mark_copied(id, &path, self.host.as_mut());
            }
            SessionEvent::ChildAdded(child) => {
                self.children.add(child);
            }
            SessionEvent::Closed(reason) => {
                self.connected = false;
                self.countdown = None;
                self.ledger.abort_pending_copies();

                if reason.is_failure() {
                    self.state = SessionState::Failed;
                    self.status = SessionStatus {
                        title: with_host(&self.host_name, "Connection failed"),
                        text: reason.status_text(),
                        icon: StatusIcon::Failed,
                    };
                } else {
                    if self.state != SessionState::Failed {
                        self.state = SessionState::Closed;
                    }
                    self.status.text = reason.status_text();
                    self.status.icon = StatusIcon::Disconnected;
                }

                info!(host = %self.host_name, ident = self.ident, reason = %reason, "Connection closed");
                let run_policy = !self.finished && reason != CloseReason::Requested;
                self.close_reason = Some(reason);
                return run_policy;
            }
        }
        false
    }

    fn set_connected_status(&mut self, target: &TargetInfo) {
        self.status = SessionStatus {
            title: with_host(&self.host_name, &target.title()),
            text: target.status_text(),
            icon: StatusIcon::Connected,
        };
    }

    async fn apply_close_policy(&mut self) {
        self.tick_children();
        let remote_context = self.replay.is_connected_to(&self.host_name);

        match auto_close_policy(self.ledger.records(), self.children.children(), remote_context) {
            AutoClose::Stay => {
                debug!(
                    captures = self.ledger.len(),
                    children = self.children.len(),
                    "Session stays open after connection closed"
                );
            }
            AutoClose::Close { open } => {
                if let Some(id) = open {
                    let (ledger, mut env) = self.ledger_env();
                    match ledger.open(id, &mut env) {
                        Ok(()) => {
                            if let Err(e) = ledger.hand_over(id, env.host) {
                                warn!(capture_id = %id, error = %e, "Failed to hand capture to host");
                            }
                        }
                        Err(e) => warn!(capture_id = %id, error = %e, "Failed to auto-open capture"),
                    }
                }
                info!(host = %self.host_name, ident = self.ident, "Auto-closing session");
                self.finish().await;
            }
            AutoClose::PivotToChild { ident } => {
                info!(host = %self.host_name, ident, "Pivoting to child process session");
                self.host.open_live_session(&self.host_name, ident);
                self.finish().await;
            }
        }
    }

    // ========================================================================
    // Close
    // ========================================================================

    /// Asks to close the session, prompting for unsaved captures.
    ///
    /// Returns false if the user aborted; the session is untouched then.
    pub async fn request_close(&mut self) -> bool {
        if self.finished {
            return true;
        }

        let allowed = {
            let (ledger, mut env) = self.ledger_env();
            ledger.confirmable_close(&mut env)
        };

        if !allowed {
            return false;
        }

        self.finish().await;
        true
    }

    /// Closes the session without prompting.
    ///
    /// Disposes of unsaved captures, signals the poller to disconnect and
    /// waits for it up to the configured grace period.
    pub async fn finish(&mut self) -> CleanupReport {
        if self.finished {
            return CleanupReport::default();
        }
        self.countdown = None;

        // Deletes must be enqueued before the disconnect signal
        let mut report = {
            let (ledger, mut env) = self.ledger_env();
            ledger.clean_items(&mut env)
        };

        self.cancel.cancel();

        if let Some(task) = self.poller.take() {
            let grace = self.config.shutdown_grace();
            match timeout(grace, task).await {
                Ok(Ok(reason)) => debug!(reason = %reason, "Poller joined"),
                Ok(Err(e)) => warn!(error = %e, "Poller task failed"),
                Err(_) => warn!(
                    grace_ms = self.config.shutdown_grace_ms,
                    "Poller did not stop within the grace period, detaching"
                ),
            }
        }

        self.finished = true;
        self.connected = false;

        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event);
        }
        // A detached poller never sends `Closed`
        self.ledger.abort_pending_copies();

        // Captures announced or copies abandoned while shutting down
        if !self.ledger.is_empty() {
            let (ledger, mut env) = self.ledger_env();
            let late = ledger.clean_items(&mut env);
            report.deleted.extend(late.deleted);
            report.handed_off.extend(late.handed_off);
            report.abandoned.extend(late.abandoned);
        }

        if self.state != SessionState::Failed {
            self.state = SessionState::Closed;
        }

        info!(host = %self.host_name, ident = self.ident, "Session finished");
        report
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn with_host(host_name: &str, title: &str) -> String {
    if host_name.is_empty() {
        title.to_string()
    } else {
        format!("{host_name} - {title}")
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Drives a session the way a UI event loop would: applies poller events,
/// reconciles children and ticks the trigger countdown.
///
/// Returns once the session finished, or once the poller has stopped and the
/// session stays open for the user.
pub async fn run_session(session: &mut Session) {
    let mut child_timer = interval(session.config().child_poll_interval());
    child_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut countdown_timer: Option<Interval> = None;

    while !session.is_finished() {
        if session.countdown().is_some() {
            if countdown_timer.is_none() {
                let period = session.config().countdown_tick();
                countdown_timer = Some(interval_at(Instant::now() + period, period));
            }
        } else {
            countdown_timer = None;
        }

        tokio::select! {
            event = session.next_event() => match event {
                Some(event) => session.handle_event(event).await,
                None => break,
            },

            _ = child_timer.tick() => {
                let update = session.tick_children();
                if !update.is_empty() {
                    debug!(
                        surfaced = update.surfaced.len(),
                        removed = update.removed.len(),
                        "Children changed"
                    );
                }
            }

            _ = tick_optional(&mut countdown_timer) => {
                if let Some(CountdownTick::Remaining(_)) = session.countdown_tick() {
                    if let Some(countdown) = session.countdown() {
                        debug!(label = %countdown.label(), "Trigger countdown");
                    }
                }
            }
        }
    }
}

async fn tick_optional(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
