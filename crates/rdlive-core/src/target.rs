//! Snapshot of what the target connection knows about its process.

use serde::{Deserialize, Serialize};

/// Target identity as reported by the connection.
///
/// The API may be empty until the target initialises a graphics API, and
/// `pid` is 0 when the target does not report one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetInfo {
    /// Target executable name
    pub target: String,

    /// Graphics API in use, empty if not yet detected
    pub api: String,

    /// Target process ID, 0 if unknown
    pub pid: u32,
}

impl TargetInfo {
    /// Placeholder shown while no API has been registered.
    pub const NO_API: &'static str = "No API detected";

    pub fn new(target: impl Into<String>, api: impl Into<String>, pid: u32) -> Self {
        Self {
            target: target.into(),
            api: api.into(),
            pid,
        }
    }

    /// Returns the API name, or a placeholder if none was detected.
    pub fn api_label(&self) -> &str {
        if self.api.is_empty() {
            Self::NO_API
        } else {
            &self.api
        }
    }

    /// Status line shown once connected.
    pub fn status_text(&self) -> String {
        if self.pid == 0 {
            format!("Connection established to {} ({})", self.target, self.api_label())
        } else {
            format!(
                "Connection established to {} [PID {}] ({})",
                self.target,
                self.pid,
                self.api_label()
            )
        }
    }

    /// Window title for the session, without any host prefix.
    pub fn title(&self) -> String {
        if self.pid == 0 {
            self.target.clone()
        } else {
            format!("{} [PID {}]", self.target, self.pid)
        }
    }
}
