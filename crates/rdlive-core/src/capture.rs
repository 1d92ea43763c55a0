//! Capture records - one entry per frame capture announced by a target.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Server-assigned identifier of a capture.
///
/// Unique within the lifetime of one target connection and meaningless
/// across connections: two sessions can both hold a capture `7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureId(u32);

impl CaptureId {
    /// Creates a capture ID from the raw value sent by the target.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CaptureId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// ============================================================================
// Thumbnail
// ============================================================================

/// Raw thumbnail sent alongside a new capture.
///
/// Pixels are tightly packed RGB8 rows. Scaling and decoding for display
/// belong to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl Thumbnail {
    /// Bytes per pixel of the packed format.
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self { width, height, rgb }
    }

    /// Returns true if the buffer is non-empty and matches the dimensions.
    ///
    /// An invalid thumbnail is treated as absent (shown transparent).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let expected = (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(Self::BYTES_PER_PIXEL);
        expected > 0 && self.rgb.len() == expected
    }
}

// ============================================================================
// Capture Record
// ============================================================================

/// One captured artifact tracked by a live session.
///
/// # Persistence invariant
///
/// While `saved` is false the file at `path` is temporary: the target
/// connection (if still connected) or a replay context on the capture's
/// host is responsible for deleting it. Once `saved` is true the user owns
/// the file and nothing in the session may delete it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Identifier assigned by the target connection
    pub id: CaptureId,

    /// Display name, initially the target executable name (user-editable)
    pub name: String,

    /// Executable/target name that produced the capture
    pub target: String,

    /// Graphics API detected in the target
    pub api: String,

    /// When the capture was taken
    pub timestamp: DateTime<Utc>,

    /// Thumbnail sent with the capture announcement
    pub thumbnail: Option<Thumbnail>,

    /// Storage path, on the UI machine if `local`, else on the target host
    pub path: PathBuf,

    /// Whether the file resides on the machine running the UI
    pub local: bool,

    /// Whether the user committed the capture to a permanent location
    pub saved: bool,

    /// Whether the user loaded the capture for inspection
    pub opened: bool,

    /// Destination of a save in flight through the live connection
    pub save_pending: Option<PathBuf>,
}

impl CaptureRecord {
    /// Creates a new, unsaved and unopened record.
    pub fn new(
        id: CaptureId,
        target: impl Into<String>,
        api: impl Into<String>,
        timestamp: DateTime<Utc>,
        path: impl Into<PathBuf>,
        local: bool,
    ) -> Self {
        let target = target.into();
        Self {
            id,
            name: target.clone(),
            target,
            api: api.into(),
            timestamp,
            thumbnail: None,
            path: path.into(),
            local,
            saved: false,
            opened: false,
            save_pending: None,
        }
    }

    /// Attaches a thumbnail, dropping it if the buffer is malformed.
    #[must_use]
    pub fn with_thumbnail(mut self, thumbnail: Option<Thumbnail>) -> Self {
        self.thumbnail = thumbnail.filter(Thumbnail::is_valid);
        self
    }

    /// Converts seconds since the Unix epoch into a timestamp.
    ///
    /// Out-of-range values fall back to the epoch itself.
    pub fn timestamp_from_unix(secs: u64) -> DateTime<Utc> {
        i64::try_from(secs)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_default()
    }

    /// Returns true while the file is temporary (not yet saved).
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        !self.saved
    }

    /// Returns true while a save through the live connection is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.save_pending.is_some()
    }

    /// Returns true if the file lives on another host.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        !self.local
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Three-line text used for the capture list entry.
    pub fn display_text(&self) -> String {
        let mut text = self.name.clone();
        if !self.local {
            text.push_str(" (Remote)");
        }
        let local_time = self.timestamp.with_timezone(&Local);
        format!(
            "{text}\n{}\n{}",
            self.api,
            local_time.format("%Y-%m-%d %H:%M:%S")
        )
    }

    /// Question shown when closing a session with this capture unsaved.
    pub fn unsaved_prompt(&self) -> String {
        let local_time = self.timestamp.with_timezone(&Local);
        format!(
            "Save this capture '{}' at {}?",
            self.name,
            local_time.format("%H:%M:%S")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(local: bool) -> CaptureRecord {
        CaptureRecord::new(
            CaptureId::new(7),
            "game.exe",
            "Vulkan",
            CaptureRecord::timestamp_from_unix(1_700_000_000),
            "/tmp/capture_7.rdc",
            local,
        )
    }

    #[test]
    fn test_new_record_defaults() {
        let rec = record(true);
        assert_eq!(rec.name, "game.exe");
        assert!(rec.is_temporary());
        assert!(!rec.opened);
        assert!(!rec.is_busy());
        assert!(!rec.is_remote());
    }

    #[test]
    fn test_display_text_marks_remote() {
        let local = record(true).display_text();
        let remote = record(false).display_text();

        assert!(local.starts_with("game.exe\nVulkan\n"));
        assert!(remote.starts_with("game.exe (Remote)\nVulkan\n"));
        assert_eq!(remote.lines().count(), 3);
    }

    #[test]
    fn test_unsaved_prompt_uses_name() {
        let mut rec = record(true);
        rec.name = "boss fight".to_string();
        let prompt = rec.unsaved_prompt();
        assert!(prompt.starts_with("Save this capture 'boss fight' at "));
        assert!(prompt.ends_with('?'));
    }

    #[test]
    fn test_timestamp_from_unix() {
        let ts = CaptureRecord::timestamp_from_unix(86_400);
        assert_eq!(ts.timestamp(), 86_400);

        let overflow = CaptureRecord::timestamp_from_unix(u64::MAX);
        assert_eq!(overflow, DateTime::<Utc>::default());
    }

    #[test]
    fn test_thumbnail_validation() {
        assert!(Thumbnail::new(2, 2, vec![0; 12]).is_valid());
        assert!(!Thumbnail::new(2, 2, vec![0; 11]).is_valid());
        assert!(!Thumbnail::new(0, 0, Vec::new()).is_valid());

        let rec = record(true).with_thumbnail(Some(Thumbnail::new(4, 4, vec![1, 2, 3])));
        assert!(rec.thumbnail.is_none(), "malformed thumbnail should be dropped");

        let rec = record(true).with_thumbnail(Some(Thumbnail::new(1, 1, vec![1, 2, 3])));
        assert!(rec.thumbnail.is_some());
    }

    #[test]
    fn test_capture_id_serde_transparent() {
        let json = serde_json::to_string(&CaptureId::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: CaptureId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(), 42);
    }
}
