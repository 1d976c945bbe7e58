//! User-facing notifications.
//!
//! The tray/dialog layer is an external collaborator; this crate only
//! defines the sink it must provide. [`LogNotifier`] routes everything
//! through tracing for headless operation and tests.

use tracing::{info, warn};

/// Sink for user-facing messages.
pub trait Notifier: Send + Sync {
    /// A condition the user must see (blocking-dialog severity), such as the
    /// proxy port being taken by another process.
    fn alert(&self, message: &str);

    /// A transient status message (tray-popup severity).
    fn toast(&self, message: &str);
}

/// Notifier that logs instead of displaying anything.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, message: &str) {
        warn!("{}", message);
    }

    fn toast(&self, message: &str) {
        info!("{}", message);
    }
}
