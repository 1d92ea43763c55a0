//! rdlive - Headless live capture session driver
//!
//! Runs a live capture session against a scripted target connection and
//! reports what happened to every capture. Useful for exercising close
//! policies and cleanup without a UI.
//!
//! # Usage
//!
//! ```bash
//! # Replay a target script, saving unsaved captures on close
//! rdlive simulate session.json --save-dir ./captures --on-unsaved save
//!
//! # Print the final session state as JSON
//! rdlive simulate session.json --json
//!
//! # Show the active configuration
//! rdlive config
//!
//! # Enable debug logging
//! RUST_LOG=rdlive_session=debug rdlive simulate session.json
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: close the session, running the unsaved capture policy

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rdlive_core::{CaptureRecord, ChildProcessRecord, LiveConfig, RecentFiles};
use rdlive_session::{
    run_session, CloseReason, LiveError, NoReplay, PromptAnswer, Session, SessionDeps, SessionHost,
    SessionState, SessionStatus, SystemProcessTable,
};
use rdlive_target::{ScriptedConnector, TargetScript};

/// rdlive - live capture session manager
#[derive(Parser, Debug)]
#[command(name = "rdlive", version, about)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a session against a scripted target
    Simulate {
        /// Target script (JSON)
        script: PathBuf,

        /// Host name the target runs on (empty for this machine)
        #[arg(long, default_value = "")]
        host: String,

        /// Target ident
        #[arg(long, default_value_t = 38920)]
        ident: u32,

        /// Directory saved captures are written to
        #[arg(long, default_value = ".")]
        save_dir: PathBuf,

        /// Answer to "save this capture?" when the session closes
        #[arg(long, value_enum, default_value_t = UnsavedPolicy::Discard)]
        on_unsaved: UnsavedPolicy,

        /// Print the final session state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the config file location and values
    Config {
        /// Write the defaults to the config file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

/// How the headless host answers unsaved capture prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum UnsavedPolicy {
    Save,
    Discard,
    Cancel,
}

impl UnsavedPolicy {
    fn answer(self) -> PromptAnswer {
        match self {
            UnsavedPolicy::Save => PromptAnswer::Yes,
            UnsavedPolicy::Discard => PromptAnswer::No,
            UnsavedPolicy::Cancel => PromptAnswer::Cancel,
        }
    }
}

// ============================================================================
// Headless Host
// ============================================================================

/// `SessionHost` with no UI: prompts are answered from the command line.
struct HeadlessHost {
    save_dir: PathBuf,
    on_unsaved: UnsavedPolicy,
    current: Option<PathBuf>,
    recent: Arc<Mutex<RecentFiles>>,
}

impl SessionHost for HeadlessHost {
    fn load_capture(&mut self, path: &Path, temporary: bool, local: bool) {
        info!(path = %path.display(), temporary, local, "Loading capture");
        self.current = Some(path.to_path_buf());
    }

    fn close_capture(&mut self) {
        self.current = None;
    }

    fn current_capture_path(&self) -> Option<PathBuf> {
        self.current.clone()
    }

    fn take_capture_ownership(&mut self) {
        if let Some(path) = &self.current {
            info!(path = %path.display(), "Took ownership of loaded capture");
        }
    }

    fn choose_save_path(&mut self, record: &CaptureRecord) -> Option<PathBuf> {
        if self.on_unsaved == UnsavedPolicy::Cancel {
            return None;
        }
        let file = format!("{}_{}.rdc", record.name, record.id);
        Some(self.save_dir.join(file))
    }

    fn prompt_unsaved(&mut self, record: &CaptureRecord) -> PromptAnswer {
        let answer = self.on_unsaved.answer();
        info!(prompt = %record.unsaved_prompt(), ?answer, "Unsaved capture");
        answer
    }

    fn prompt_abandon_remote(&mut self, host: &str, record: &CaptureRecord, saving: bool) -> bool {
        let abandon = self.on_unsaved != UnsavedPolicy::Cancel;
        warn!(host, id = %record.id, saving, abandon, "Remote capture unreachable");
        abandon
    }

    fn confirm_delete(&mut self, _count: usize) -> bool {
        true
    }

    fn report_error(&mut self, error: &LiveError) {
        error!(title = error.title(), error = %error, "Session error");
    }

    fn open_live_session(&mut self, host: &str, ident: u32) {
        info!(host, ident, "Child process is connectable, run another session to attach");
    }

    fn add_recent_file(&mut self, path: &Path) {
        if let Ok(mut recent) = self.recent.lock() {
            recent.add(path);
        }
    }

    fn launch_new_instance(&mut self, path: &Path) -> io::Result<()> {
        info!(path = %path.display(), "New instance requested");
        Ok(())
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Serialize)]
struct SessionReport<'a> {
    state: SessionState,
    status: &'a SessionStatus,
    close_reason: Option<&'a CloseReason>,
    captures: &'a [CaptureRecord],
    children: &'a [ChildProcessRecord],
    recent_files: Vec<&'a Path>,
}

fn print_summary(session: &Session, recent: &RecentFiles) {
    let status = session.status();
    println!("{}: {}", status.title, status.text);
    for record in session.captures() {
        println!("  kept   {} -> {}", record.display_text(), record.path.display());
    }
    for child in session.children() {
        println!("  child  {} [PID {}]", child.name, child.pid);
    }
    for path in recent.iter() {
        println!("  recent {}", path.display());
    }
}

// ============================================================================
// Commands
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<LiveConfig> {
    let config = match path {
        Some(path) => LiveConfig::load(path),
        None => LiveConfig::load_default(),
    };
    config.context("Failed to load config")
}

fn show_config(path: Option<&Path>, init: bool) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => LiveConfig::default_path().context("Failed to locate config directory")?,
    };
    let config = LiveConfig::load(&path).context("Failed to load config")?;

    if init && !path.exists() {
        config.save(&path).context("Failed to write config")?;
        println!("Wrote defaults to {}", path.display());
    }

    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&config).context("Failed to render config")?);
    Ok(())
}

#[tokio::main]
async fn simulate(
    config: LiveConfig,
    script_path: &Path,
    host_name: String,
    ident: u32,
    save_dir: PathBuf,
    on_unsaved: UnsavedPolicy,
    json: bool,
) -> Result<()> {
    let script = TargetScript::load(script_path)
        .with_context(|| format!("Failed to load target script {}", script_path.display()))?
        .or_idle_ms(config.idle_poll_ms);
    fs::create_dir_all(&save_dir)
        .with_context(|| format!("Failed to create {}", save_dir.display()))?;

    let recent = Arc::new(Mutex::new(RecentFiles::new(config.recent_files_max)));
    let host = HeadlessHost {
        save_dir,
        on_unsaved,
        current: None,
        recent: Arc::clone(&recent),
    };
    let (connector, _control) = ScriptedConnector::new(script);

    let deps = SessionDeps {
        connector: Arc::new(connector),
        processes: Arc::new(SystemProcessTable::new()),
        host: Box::new(host),
        replay: Box::new(NoReplay),
        config,
    };

    info!(host = %host_name, ident, "Starting session");
    let mut session = Session::start(host_name, ident, deps);

    tokio::select! {
        _ = run_session(&mut session) => {}
        result = wait_for_shutdown_signal() => {
            if let Err(e) = result {
                error!(error = %e, "Error waiting for shutdown signal");
            }
            info!("Shutdown signal received");
        }
    }

    if !session.is_finished() && !session.request_close().await {
        warn!("Close cancelled, discarding remaining captures");
        let report = session.finish().await;
        info!(
            deleted = report.deleted.len(),
            handed_off = report.handed_off.len(),
            abandoned = report.abandoned.len(),
            "Forced cleanup complete"
        );
    }

    let recent = recent.lock().map(|r| r.clone()).unwrap_or_default();
    if json {
        let report = SessionReport {
            state: session.state(),
            status: session.status(),
            close_reason: session.close_reason(),
            captures: session.captures(),
            children: session.children(),
            recent_files: recent.iter().collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&session, &recent);
    }

    if let Some(e) = session.close_error() {
        warn!(error = %e, "Session ended abnormally");
    }
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rdlive=info".parse()?)
                .add_directive("rdlive_session=info".parse()?)
                .add_directive("rdlive_target=info".parse()?),
        )
        .init();

    match args.command {
        Command::Simulate {
            script,
            host,
            ident,
            save_dir,
            on_unsaved,
            json,
        } => {
            let config = load_config(args.config.as_deref())?;
            simulate(config, &script, host, ident, save_dir, on_unsaved, json)
        }
        Command::Config { init } => show_config(args.config.as_deref(), init),
    }
}
