//! rdlive Core - Shared types for live capture sessions
//!
//! This crate provides the value types shared between the target
//! connection contract (`rdlive-target`) and the session manager
//! (`rdlive-session`), plus the configuration layer.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod capture;
pub mod child;
pub mod config;
pub mod error;
pub mod target;

// Re-exports for convenience
pub use capture::{CaptureId, CaptureRecord, Thumbnail};
pub use child::ChildProcessRecord;
pub use config::{LiveConfig, RecentFiles};
pub use error::{ConfigError, ConfigResult};
pub use target::TargetInfo;
