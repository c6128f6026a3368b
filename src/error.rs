//! Synchronous, caller-visible errors.
//!
//! Runtime failures during listening or per-connection I/O are never
//! surfaced here; those travel through the error-notification path as
//! [`crate::event::ErrorEvent`]s.

use std::fmt;

/// Errors returned by [`crate::server::IdentServer`] construction and
/// lifecycle calls.
#[derive(Debug, PartialEq, Eq)]
pub enum ServerError {
    /// The configured identity was empty or whitespace-only.
    BlankIdentity,
    /// `start()` was called while the server was already running.
    AlreadyRunning,
    /// `start()` was called after the server was shut down.
    ShutDown,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::BlankIdentity => {
                write!(f, "identity must not be empty or whitespace-only")
            }
            ServerError::AlreadyRunning => write!(f, "server is already running"),
            ServerError::ShutDown => write!(f, "server has been shut down"),
        }
    }
}

impl std::error::Error for ServerError {}
