//! Session log lines for the host's own log view.
//!
//! The session reports what it does (connecting, commands sent, why a link
//! dropped) through `tracing`. [`LogCaptureLayer`] turns each record into a
//! [`LogEntry`] on a broadcast channel, so the CLI can print them as
//! `(HH:MM:SS) > message` lines next to its status output.

use tokio::sync::broadcast;
use tracing::{Event, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use crate::event::LogEntry;

/// Entries buffered per receiver before the oldest are dropped.
pub const LOG_CHANNEL_CAPACITY: usize = 256;

/// The layer to register plus a receiver already attached to it.
pub fn build_log_channel() -> (LogCaptureLayer, broadcast::Receiver<LogEntry>) {
    let (tx, rx) = broadcast::channel(LOG_CHANNEL_CAPACITY);
    (LogCaptureLayer { tx }, rx)
}

/// Fan-out of session log records. A lagging or absent receiver never
/// holds up the code that logged.
pub struct LogCaptureLayer {
    tx: broadcast::Sender<LogEntry>,
}

impl LogCaptureLayer {
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }
}

impl<S> Layer<S> for LogCaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = MessageVisitor(String::new());
        event.record(&mut message);

        let meta = event.metadata();
        let _ = self.tx.send(LogEntry {
            level: meta.level().to_string(),
            target: meta.target().to_string(),
            message: message.0,
        });
    }
}

struct MessageVisitor(String);

impl MessageVisitor {
    fn push(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if name == "message" {
            let rest = std::mem::take(&mut self.0);
            self.0 = value.to_string();
            if !rest.is_empty() {
                self.0.push_str(", ");
                self.0.push_str(&rest);
            }
        } else if self.0.is_empty() {
            self.0 = format!("{name}={value}");
        } else {
            self.0.push_str(&format!(", {name}={value}"));
        }
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.push(field.name(), format_args!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.push(field.name(), format_args!("{value}"));
    }
}
