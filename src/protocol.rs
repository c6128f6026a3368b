//! RFC 1413 query and response formatting.
//!
//! The wire exchange is a single line in each direction: the client sends
//! one query line, the server answers with one response line of the form
//! `<query> : USERID : UNIX : <identity>` terminated by CRLF. The query
//! content is not validated as a port pair; it is echoed back trimmed.

use bytes::BytesMut;

/// Protocol line terminator.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Maximum query length in octets, per RFC 1413 section 5.
pub const MAX_QUERY_LENGTH: u64 = 512;

/// The operating system type reported in every response.
///
/// Always the literal `UNIX` regardless of the actual host platform.
const OS_TYPE: &str = "UNIX";

/// Format the response line for a raw query line.
///
/// Returns `None` if the query is empty after trimming surrounding
/// whitespace; no response is sent for an empty query.
pub fn format_response(query: &str, identity: &str) -> Option<BytesMut> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut response =
        BytesMut::with_capacity(trimmed.len() + identity.len() + OS_TYPE.len() + 24);
    response.extend_from_slice(trimmed.as_bytes());
    response.extend_from_slice(b" : USERID : ");
    response.extend_from_slice(OS_TYPE.as_bytes());
    response.extend_from_slice(b" : ");
    response.extend_from_slice(identity.as_bytes());
    response.extend_from_slice(LINE_TERMINATOR.as_bytes());
    Some(response)
}
