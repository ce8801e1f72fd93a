//! Wire-visible error taxonomy.
//!
//! Every variant here corresponds 1:1 to an `error` message a peer can
//! receive (§7). None of these ever close a connection or a session — they
//! are recovered entirely at the message boundary.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Invalid message format")]
    ParseError,

    #[error("Unknown message type")]
    UnknownMessageType,

    #[error("{0}")]
    Validation(String),

    #[error("Session not found")]
    SessionNotFound,
}

impl DispatchError {
    /// The exact string sent to the peer in `{type: "error", message}`.
    pub fn wire_message(&self) -> String {
        self.to_string()
    }
}
