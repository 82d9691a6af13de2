use std::net::SocketAddr;

use crate::command::Command;

/// Notifications emitted by a `Session` to its caller.
/// A UI subscribes to these to drive its status label and log view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connection attempt has started
    Connecting { addr: SocketAddr },
    /// The socket is up and the peer listener is armed
    Connected { addr: SocketAddr },
    /// The connection attempt failed; the session is spent
    ConnectFailed { reason: String },
    /// A command byte was fully written to the socket
    CommandSent { command: Command },
    /// The session reached its terminal state.
    /// `by_user` is true only for caller-initiated disconnects, so a UI can
    /// skip the error dialog in that case.
    Disconnected { by_user: bool, reason: String },
}

impl SessionEvent {
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SessionEvent::Disconnected { .. })
    }
}

/// A captured `tracing` record, see [`crate::log_layer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: String,
    pub target: String,
    pub message: String,
}
