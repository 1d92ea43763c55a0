//! Auto-close policy applied when a connection closes.
//!
//! The common "launch, capture once, done" flow should need no extra
//! clicks, so a session with at most one capture closes itself:
//!
//! | captures | live children | result |
//! |----------|---------------|--------|
//! | 1        | any           | open the capture (if possible), close |
//! | 0        | 0             | close |
//! | 0        | 1             | open a session on the child, close |
//! | 0        | 2+            | stay, the user picks a child |
//! | 2+       | any           | stay |
//!
//! A single capture that is already opened, or that is remote while no
//! replay context is connected to the session host, keeps the session open.

use rdlive_core::{CaptureId, CaptureRecord, ChildProcessRecord};

/// What the session does after its connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoClose {
    /// Keep the session open
    Stay,

    /// Close the session, opening the given capture first
    Close { open: Option<CaptureId> },

    /// Open a new session against the child and close this one
    PivotToChild { ident: u32 },
}

/// Decides the auto-close action.
///
/// `remote_context_available` is whether a replay context is connected to
/// the session's host. `live_children` must already be reconciled.
pub fn auto_close_policy(
    captures: &[CaptureRecord],
    live_children: &[ChildProcessRecord],
    remote_context_available: bool,
) -> AutoClose {
    match (captures, live_children) {
        ([capture], _) => {
            if capture.is_remote() && !remote_context_available {
                return AutoClose::Stay;
            }
            if capture.opened {
                return AutoClose::Stay;
            }
            AutoClose::Close {
                open: Some(capture.id),
            }
        }
        ([], []) => AutoClose::Close { open: None },
        ([], [child]) => AutoClose::PivotToChild { ident: child.ident },
        _ => AutoClose::Stay,
    }
}
