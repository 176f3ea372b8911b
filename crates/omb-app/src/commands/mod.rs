//! UI-facing controllers.
//!
//! Each function is one request from the UI shell. Errors are returned to
//! the caller; failures of write/resize/kill on terminals that are already
//! going away are logged and swallowed.

pub mod focus;
pub mod sessions;
pub mod terminal;

#[cfg(test)]
pub(crate) mod test_support;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown session {0}")]
    UnknownSession(String),
    #[error("unknown tab {0}")]
    UnknownTab(String),
    #[error("tab {0} was closed before its terminal started")]
    TabClosed(String),
    #[error("failed to start terminal: {0}")]
    Spawn(#[from] omb_pty::SpawnError),
    #[error("spawn task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
