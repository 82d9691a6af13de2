//! Client-side command session for Hedgehog remote-controlled robots.
//!
//! A [`Session`] owns one TCP connection to a device. Movement commands go
//! out as single bytes, never more than one in flight; anything the device
//! sends back, including a close, ends the session.
//!
//! ```rust,no_run
//! # use hedgehog_link::{Command, Session, SessionConfig, SessionEvent};
//! # async fn example() -> Result<(), hedgehog_link::SessionError> {
//! let session = Session::new("192.168.4.1:3131".parse().unwrap(), SessionConfig::default());
//! let mut events = session.subscribe_events();
//!
//! session.connect().await?;
//! session.steer(Command::Forward).await?;
//! session.send_command(Command::Stop).await?;
//! session.disconnect(true, "Disconnected by user.").await;
//!
//! while let Ok(ev) = events.try_recv() {
//!     if let SessionEvent::Disconnected { by_user, reason } = ev {
//!         println!("closed (by_user={by_user}): {reason}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod log_layer;
pub mod session;

mod link;
mod listener;

pub use command::Command;
pub use config::{SessionConfig, DEFAULT_PORT, SEND_BUSY_TIMEOUT, SEND_POLL_INTERVAL};
pub use error::SessionError;
pub use event::{LogEntry, SessionEvent};
pub use session::{Session, SessionState};
