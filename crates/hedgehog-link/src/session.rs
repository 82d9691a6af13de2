//! The command session: one TCP connection to one Hedgehog.
//!
//! # State machine
//!
//! ```text
//!                 connect()
//!   Disconnected ───────────► Connecting ──(ok)──► Connected ◄──┐
//!        ▲                        │                  │          │ write done
//!        │        (connect error) │                  │ send     │
//!        ├────────────────────────┘                  ▼          │
//!        │                                          Busy ───────┘
//!        │   peer closed / write failed / disconnect()   │
//!        └───────────────────────────────────────────────┘
//!                   (always via Connected)
//! ```
//!
//! All transitions go through a single `watch::Sender<SessionState>`; its
//! `send_if_modified` is the one critical section guarding the state, so a
//! send finishing and a concurrent disconnect can never interleave.
//! Waiters subscribe to the same channel and are woken on every change.
//!
//! A session is single-use: once it reaches `Disconnected` after a connect
//! attempt it stays there. Reconnecting means creating a new `Session`.

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use tokio::{
    net::TcpStream,
    sync::{broadcast, watch},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    command::Command,
    config::SessionConfig,
    error::SessionError,
    event::SessionEvent,
    link::{self, Link},
    listener,
};

/// Connection state of a [`Session`]. Exactly one value at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// A send is in flight; new sends wait.
    Busy,
}

impl SessionState {
    /// Text for a status label.
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting...",
            SessionState::Connected => "Connected",
            SessionState::Busy => "Busy",
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Busy)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub(crate) struct Inner {
    addr: SocketAddr,
    config: SessionConfig,
    state_tx: watch::Sender<SessionState>,
    event_tx: broadcast::Sender<SessionEvent>,
    /// Set by the first `connect`; sessions are never reused.
    used: AtomicBool,
    pending: Mutex<Option<Command>>,
    link: Mutex<Option<Link>>,
}

/// Cheap-to-clone handle to a command session.
///
/// Clones share the same socket and state, so several input sources (key
/// presses, a gamepad, a script) can send through one session at once.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("addr", &self.inner.addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Reverts `Busy` to `Connected` when a send ends, including when the send
/// future is dropped part-way.
struct BusyGuard<'a> {
    session: &'a Session,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.session
            .transition(SessionState::Busy, SessionState::Connected);
    }
}

impl Session {
    pub fn new(addr: SocketAddr, config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                addr,
                config,
                state_tx,
                event_tx,
                used: AtomicBool::new(false),
                pending: Mutex::new(None),
                link: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.addr
    }

    /// `host:port` text for an address label.
    pub fn peer_label(&self) -> String {
        self.inner.addr.to_string()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to connect/send/disconnect notifications. Subscribe before
    /// calling `connect` to see the whole lifecycle.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    /// The last command accepted for sending. Informational only.
    pub fn pending_command(&self) -> Option<Command> {
        *self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── Connect ──────────────────────────────────────────────────────────────

    /// Open the connection and arm the peer listener.
    ///
    /// Fails with `AlreadyUsed` on every call after the first, whatever the
    /// first call's outcome was.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.inner.used.swap(true, Ordering::SeqCst)
            || !self.transition(SessionState::Disconnected, SessionState::Connecting)
        {
            return Err(SessionError::AlreadyUsed);
        }

        let addr = self.inner.addr;
        info!("Connecting to Hedgehog at {addr}...");
        self.emit(SessionEvent::Connecting { addr });

        let stream = match self.open_stream().await {
            Ok(s) => s,
            Err(e) => {
                let reason = e.to_string();
                self.transition(SessionState::Connecting, SessionState::Disconnected);
                warn!("Error connecting to {addr}: {reason}");
                self.emit(SessionEvent::ConnectFailed {
                    reason: reason.clone(),
                });
                return Err(SessionError::ConnectFailure(reason));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {e}");
        }
        let (read_half, write_half) = stream.into_split();
        *self.lock_link() = Some(Link::spawn(write_half));

        self.transition(SessionState::Connecting, SessionState::Connected);
        info!("Connected to {addr}");
        self.emit(SessionEvent::Connected { addr });

        tokio::spawn(listener::watch_peer(
            read_half,
            Arc::downgrade(&self.inner),
            self.subscribe_state(),
        ));
        Ok(())
    }

    async fn open_stream(&self) -> std::io::Result<TcpStream> {
        bounded_connect(
            TcpStream::connect(self.inner.addr),
            self.inner.config.connect_timeout,
        )
        .await
    }

    // ── Send ─────────────────────────────────────────────────────────────────

    /// Write one command byte.
    ///
    /// Waits for an in-flight send to finish, up to `config.send_timeout`
    /// (`SendTimeout`, session stays connected). Fails at once with
    /// `NotConnected` when there is no live connection. A write that does
    /// not complete tears the link down and returns `LinkFailure`.
    pub async fn send_command(&self, command: Command) -> Result<(), SessionError> {
        let started = Instant::now();
        let deadline = started + self.inner.config.send_timeout;
        let mut state_rx = self.subscribe_state();

        // Wait out any in-flight send, then claim Busy atomically.
        loop {
            match self.wait_while_busy(&mut state_rx, Some(deadline)).await {
                SessionState::Busy => {
                    let waited = started.elapsed();
                    warn!("Could not send {command}, send request timed out");
                    return Err(SessionError::SendTimeout { waited });
                }
                SessionState::Disconnected | SessionState::Connecting => {
                    return Err(SessionError::NotConnected);
                }
                SessionState::Connected => {
                    if self.transition(SessionState::Connected, SessionState::Busy) {
                        break;
                    }
                    // Another sender won the race; wait again.
                }
            }
        }
        let busy = BusyGuard { session: self };

        *self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(command);

        let write_tx = self.lock_link().as_ref().map(Link::sender);
        let Some(write_tx) = write_tx else {
            return Err(SessionError::NotConnected);
        };

        match link::write_byte(&write_tx, command.code()).await {
            Ok(()) => {
                debug!(code = command.code(), "sent {command}");
                self.emit(SessionEvent::CommandSent { command });
                Ok(())
            }
            Err(e) => {
                let reason = format!("Tried to send {command} to Hedgehog, failed: {e}");
                warn!("{reason}");
                // Leave Busy first so the disconnect path is not blocked on us.
                drop(busy);
                self.close(false, reason.clone()).await;
                Err(SessionError::LinkFailure(reason))
            }
        }
    }

    /// Send `Stop` followed by `command`, each awaiting its own completion.
    /// This is what a key press does on the device; releasing the key is a
    /// plain `send_command(Command::Stop)`.
    pub async fn steer(&self, command: Command) -> Result<(), SessionError> {
        self.send_command(Command::Stop).await?;
        if command != Command::Stop {
            self.send_command(command).await?;
        }
        Ok(())
    }

    // ── Disconnect ───────────────────────────────────────────────────────────

    /// Close the connection from our side.
    ///
    /// Waits for an in-flight send to finish (without a ceiling), then closes
    /// the socket and emits `Disconnected { by_user, reason }` if the session
    /// was connected. A no-op otherwise.
    pub async fn disconnect(&self, by_user: bool, reason: impl Into<String>) {
        self.close(by_user, reason.into()).await;
    }

    /// Common disconnect path. Returns whether this call performed the
    /// transition; exactly one caller ever does.
    pub(crate) async fn close(&self, by_user: bool, reason: String) -> bool {
        let mut state_rx = self.subscribe_state();
        loop {
            match self.wait_while_busy(&mut state_rx, None).await {
                SessionState::Connected => {
                    if self.transition(SessionState::Connected, SessionState::Disconnected) {
                        break;
                    }
                }
                _ => return false,
            }
        }

        // Dropping the link stops the writer; the listener sees Disconnected
        // and drops the read half, which closes the socket.
        drop(self.lock_link().take());

        if by_user {
            info!("Disconnected from {}: {reason}", self.inner.addr);
        } else {
            warn!("Connection to {} lost: {reason}", self.inner.addr);
        }
        self.emit(SessionEvent::Disconnected { by_user, reason });
        true
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Sleep until the state is not `Busy` or `deadline` passes, re-checking
    /// at least every `poll_interval`. Returns the last observed state.
    async fn wait_while_busy(
        &self,
        state_rx: &mut watch::Receiver<SessionState>,
        deadline: Option<Instant>,
    ) -> SessionState {
        let poll = self.inner.config.poll_interval;
        loop {
            let current = *state_rx.borrow_and_update();
            if current != SessionState::Busy {
                return current;
            }
            let nap = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return current;
                    }
                    poll.min(d - now)
                }
                None => poll,
            };
            let _ = tokio::time::timeout(nap, state_rx.changed()).await;
        }
    }

    /// Atomic compare-and-set on the state.
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.inner.state_tx.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                false
            }
        })
    }

    fn lock_link(&self) -> std::sync::MutexGuard<'_, Option<Link>> {
        self.inner
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: SessionState) {
        self.inner.state_tx.send_replace(state);
    }
}

/// Await a connect attempt, giving up with `TimedOut` after `limit`.
async fn bounded_connect<F, T>(attempt: F, limit: Option<Duration>) -> std::io::Result<T>
where
    F: std::future::Future<Output = std::io::Result<T>>,
{
    match limit {
        None => attempt.await,
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .unwrap_or_else(|_| {
                Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no answer within {} ms", limit.as_millis()),
                ))
            }),
    }
}
