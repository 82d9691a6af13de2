use std::time::Duration;

/// Well-known TCP port the Hedgehog firmware listens on.
pub const DEFAULT_PORT: u16 = 3131;

/// How long a send may wait for an in-flight send before giving up.
pub const SEND_BUSY_TIMEOUT: Duration = Duration::from_millis(3000);

/// Re-check interval while waiting for the session to leave `Busy`.
pub const SEND_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Capacity of the session event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Timing knobs for a single `Session`.
///
/// `Default` yields the fixed device contract (3000 ms ceiling, 10 ms poll,
/// no connect timeout). The fields are public so tests and embedding callers
/// can tighten them.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Ceiling on the busy-wait in `send_command`.
    pub send_timeout: Duration,

    /// Poll granularity of the busy-wait. State changes wake waiters
    /// immediately; this only bounds how long a waiter sleeps between checks.
    pub poll_interval: Duration,

    /// Optional ceiling on the TCP connect. `None` waits until the transport
    /// resolves on its own.
    pub connect_timeout: Option<Duration>,

    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_timeout: SEND_BUSY_TIMEOUT,
            poll_interval: SEND_POLL_INTERVAL,
            connect_timeout: None,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl SessionConfig {
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
