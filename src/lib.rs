//! identd: a minimal RFC 1413 identification server.
//!
//! Answers every ident query with a single statically configured identity
//! string instead of performing a real lookup against the OS socket table:
//!
//! - One background accept loop per running server, started by
//!   [`IdentServer::start`] and stopped cooperatively.
//! - One task per accepted connection: read one query line, write one
//!   `<query> : USERID : UNIX : <identity>` response, close.
//! - Runtime failures are delivered to subscribed observers as
//!   [`ErrorEvent`]s; they never crash the server.
//!
//! See <https://www.rfc-editor.org/rfc/rfc1413.txt> for the protocol.

pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod server;

pub use error::ServerError;
pub use event::ErrorEvent;
pub use server::{IdentServer, ObserverId, DEFAULT_TIMEOUT, IDENT_PORT};
