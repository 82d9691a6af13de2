use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The transport could not establish the connection. Terminal for the
    /// session; a fresh `Session` is needed to try again.
    #[error("could not connect: {0}")]
    ConnectFailure(String),

    /// Another send held the session past the busy ceiling. The session is
    /// still connected and the caller may retry.
    #[error("send request timed out after {} ms", .waited.as_millis())]
    SendTimeout { waited: Duration },

    #[error("not connected to Hedgehog")]
    NotConnected,

    /// A write did not complete; the link has been torn down.
    #[error("link failure: {0}")]
    LinkFailure(String),

    /// The listener saw inbound data or a close from the device.
    #[error("peer closed the connection: {0}")]
    PeerClosed(String),

    /// `connect` was called on a session that already had its one attempt.
    #[error("session already used; create a new session to reconnect")]
    AlreadyUsed,

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

impl SessionError {
    /// Whether this error means the connection is gone (as opposed to a
    /// send that merely could not be issued right now).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::ConnectFailure(_)
                | SessionError::LinkFailure(_)
                | SessionError::PeerClosed(_)
        )
    }
}
