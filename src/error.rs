//! Error types for terminal sessions.

use thiserror::Error;

/// Errors surfaced by a terminal session.
#[derive(Debug, Error)]
pub enum TermError {
    /// The program could not be spawned, or an OS-level pty operation failed.
    /// The session is left stopped.
    #[error("session error: {0}")]
    Session(String),

    /// No ready marker appeared before the deadline. `tail` holds the end of the
    /// sanitized output seen so far; the unread buffer is kept for the next wait.
    #[error("Timeout | Buffer: {tail:?}")]
    Timeout { tail: String },

    /// The reader observed end-of-stream or the process exited during a wait.
    #[error("Subprocess died")]
    ProcessDied,

    /// Writing to an open input side failed.
    #[error("pty I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TermError {
    pub(crate) fn session(context: &str, err: impl std::fmt::Display) -> Self {
        TermError::Session(format!("{context}: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, TermError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_quotes_tail() {
        let err = TermError::Timeout {
            tail: "ls\nfoo".to_string(),
        };
        assert_eq!(err.to_string(), "Timeout | Buffer: \"ls\\nfoo\"");
    }

    #[test]
    fn test_session_context_prefix() {
        let err = TermError::session("failed to open PTY", "out of ptys");
        assert_eq!(err.to_string(), "session error: failed to open PTY: out of ptys");
    }
}
