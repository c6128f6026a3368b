//! Error notification payloads.
//!
//! An [`ErrorEvent`] carries a runtime failure (a descriptive message, an
//! underlying I/O cause, or both) from the accept loop or a connection
//! handler to whatever observers are subscribed on the server. Events are
//! built fresh per failure, delivered synchronously, and then dropped.

use std::io;

/// A non-fatal runtime failure reported to error observers.
#[derive(Debug, Default)]
pub struct ErrorEvent {
    message: Option<String>,
    cause: Option<io::Error>,
}

impl ErrorEvent {
    /// Create an event from an explicit message and/or a captured cause.
    ///
    /// All four presence combinations are valid; construction never fails.
    pub fn new(message: Option<String>, cause: Option<io::Error>) -> Self {
        ErrorEvent { message, cause }
    }

    /// Create an event carrying only a descriptive message.
    pub fn from_message(message: impl Into<String>) -> Self {
        ErrorEvent {
            message: Some(message.into()),
            cause: None,
        }
    }

    /// Create an event carrying only a captured cause.
    pub fn from_cause(cause: io::Error) -> Self {
        ErrorEvent {
            message: None,
            cause: Some(cause),
        }
    }

    /// Create an event carrying both a message and the cause behind it.
    pub fn with_context(message: impl Into<String>, cause: io::Error) -> Self {
        ErrorEvent {
            message: Some(message.into()),
            cause: Some(cause),
        }
    }

    /// The explicit message this event was constructed with, if any.
    pub fn explicit_message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The captured failure cause, if any.
    pub fn cause(&self) -> Option<&io::Error> {
        self.cause.as_ref()
    }

    /// The effective message: the explicit message if present, otherwise
    /// the cause's own message, otherwise `None`.
    pub fn message(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.cause.as_ref().map(|e| e.to_string()))
    }
}
