//! Errors reported by target connections.

use thiserror::Error;

/// Errors that can occur talking to a target.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    /// The target could not be reached or refused the connection.
    #[error("target unreachable at {host} (ident {ident}): {reason}")]
    Unreachable {
        host: String,
        ident: u32,
        reason: String,
    },

    /// The connection broke while exchanging messages.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A target script could not be loaded.
    #[error("invalid target script: {0}")]
    Script(String),
}

impl TargetError {
    /// Creates a protocol error from any error type.
    pub fn protocol<E: std::fmt::Display>(err: E) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_error_display() {
        let err = TargetError::Unreachable {
            host: "devbox".to_string(),
            ident: 38920,
            reason: "timed out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "target unreachable at devbox (ident 38920): timed out"
        );

        let err = TargetError::protocol("bad packet");
        assert_eq!(err.to_string(), "protocol error: bad packet");
    }
}
