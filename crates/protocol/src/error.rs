//! Protocol framing errors (§4.4). A socket that produced one of these is
//! always returned via `release_broken`, never `release`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("missing CRLF terminator after value data")]
    MissingValueCrlf,
    #[error("stream ended without an END terminator")]
    MissingEndAtEos,
}
