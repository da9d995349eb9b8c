//! Operator notification.
//!
//! The agent needs to tell a human when it cannot run, most importantly when
//! the configuration file had to be created from placeholders.

use tracing::warn;

/// Something that can put a message in front of the operator.
pub trait Notifier {
    fn notify_operator(&self, message: &str);
}

/// Writes the message to stderr and the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify_operator(&self, message: &str) {
        warn!("{}", message);
        eprintln!("{}", message);
    }
}

/// Discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify_operator(&self, _message: &str) {}
}
