//! Configuration for live capture sessions.
//!
//! Settings are read from `$XDG_CONFIG_HOME/rdlive/config.toml`. Every field
//! has a default, so a missing file or a partial file is fine.
//!
//! ```toml
//! child_poll_interval_ms = 1000
//! shutdown_grace_ms = 3000
//! username = "builder"
//! ```

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Default child process reconciliation period.
pub const DEFAULT_CHILD_POLL_INTERVAL_MS: u64 = 1000;

/// Default trigger countdown tick.
pub const DEFAULT_COUNTDOWN_TICK_MS: u64 = 1000;

/// Default time to wait for the poller thread on close.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 3000;

/// Default receive timeout for the bundled scripted target.
pub const DEFAULT_IDLE_POLL_MS: u64 = 10;

/// Default number of recent capture files remembered.
pub const DEFAULT_RECENT_FILES_MAX: usize = 10;

/// Settings shared by every session in the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// How often child processes are reconciled against the OS (ms)
    pub child_poll_interval_ms: u64,

    /// Period of one trigger countdown step (ms)
    pub countdown_tick_ms: u64,

    /// How long to wait for the poller thread after a disconnect (ms)
    pub shutdown_grace_ms: u64,

    /// Receive timeout used by targets that simulate idling (ms)
    pub idle_poll_ms: u64,

    /// User name sent to the target when connecting
    pub username: String,

    /// Directory for temporary capture copies
    pub temp_dir: PathBuf,

    /// Maximum entries kept in the recent files list
    pub recent_files_max: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            child_poll_interval_ms: DEFAULT_CHILD_POLL_INTERVAL_MS,
            countdown_tick_ms: DEFAULT_COUNTDOWN_TICK_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            username: default_username(),
            temp_dir: std::env::temp_dir().join("rdlive"),
            recent_files_max: DEFAULT_RECENT_FILES_MAX,
        }
    }
}

impl LiveConfig {
    /// Returns the default config file location.
    pub fn default_path() -> ConfigResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("rdlive").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Loads the config from `path`, falling back to defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Loads the config from the default location.
    pub fn load_default() -> ConfigResult<Self> {
        Self::load(&Self::default_path()?)
    }

    /// Writes the config as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn child_poll_interval(&self) -> Duration {
        Duration::from_millis(self.child_poll_interval_ms.max(1))
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Returns the login name of the current user.
fn default_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

// ============================================================================
// Recent Files
// ============================================================================

/// Most-recent-first list of saved capture paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentFiles {
    max: usize,
    entries: VecDeque<PathBuf>,
}

impl RecentFiles {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            entries: VecDeque::with_capacity(max),
        }
    }

    /// Moves `path` to the front, dropping the oldest entry past the limit.
    pub fn add(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.entries.retain(|existing| existing != &path);
        self.entries.push_front(path);

        while self.entries.len() > self.max {
            self.entries.pop_back();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RecentFiles {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_FILES_MAX)
    }
}
