//! rdlive Session - live capture session manager
//!
//! One `Session` per connection to an instrumented target process. The
//! session runs a background poller against the target connection, keeps
//! the captures the target produced in a ledger, and tracks the child
//! processes the target spawned.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── Session (UI side) ───────────────────────────┐
//! │  CaptureLedger      ChildTracker      Countdown      auto_close_policy   │
//! └────────┬────────────────────▲────────────────────────────────────────────┘
//!          │ PollerRequest      │ SessionEvent
//!          ▼                    │
//! ┌──────────────────── SessionPoller (blocking thread) ─────────────────────┐
//! │           owns Box<dyn TargetControl> for its whole lifetime             │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! No `.unwrap()`, `.expect()`, `panic!()` in non-test code. Poller-side
//! failures become `SessionEvent::Closed`; UI-side failures are `LiveError`s.

pub mod children;
pub mod countdown;
pub mod error;
pub mod host;
pub mod ledger;
pub mod policy;
pub mod poller;
pub mod process;
pub mod session;

pub use children::{ChildTracker, ChildUpdate};
pub use countdown::{Countdown, CountdownTick};
pub use error::LiveError;
pub use host::{NoReplay, PromptAnswer, ReplayContext, SessionHost};
pub use ledger::{CaptureLedger, CleanupReport, LedgerEnv, SaveOutcome};
pub use policy::{auto_close_policy, AutoClose};
pub use poller::{
    spawn_poller, CloseReason, ConnectParams, PollerHandle, PollerRequest, RequestBatch,
    RequestHandle, SessionEvent, SessionPoller,
};
pub use process::{ProcessTable, SystemProcessTable};
pub use session::{run_session, Session, SessionDeps, SessionState, SessionStatus, StatusIcon};
