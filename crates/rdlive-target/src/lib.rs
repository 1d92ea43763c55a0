//! rdlive Target - Target-control connection contract
//!
//! This crate describes what the session manager consumes from a live
//! target connection:
//! - `TargetControl` - one open connection to an instrumented process
//! - `TargetConnector` - opens connections by host and target identifier
//! - `TargetMessage` - updates received from the target
//!
//! It also ships `ScriptedConnector`, a deterministic target driven by a
//! JSON script, used by the `simulate` CLI and by tests.

pub mod control;
pub mod error;
pub mod message;
pub mod scripted;

pub use control::{TargetConnector, TargetControl};
pub use error::TargetError;
pub use message::{NewCapture, TargetMessage};
pub use scripted::{ScriptControl, ScriptEnd, ScriptStep, ScriptedConnector, TargetCall, TargetScript};
