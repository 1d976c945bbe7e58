//! Error types for routing-mode transitions.

use thiserror::Error;

use super::system::SystemProxyError;
use super::RoutingMode;

/// Errors from routing-mode transitions.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Applying the mode's OS-level effect failed.
    ///
    /// The mode has already been persisted when this is returned; callers
    /// surface the failure to the user rather than rolling back.
    #[error("Failed to apply {mode} routing at the OS level")]
    EffectFailed {
        /// The mode whose effect failed.
        mode: RoutingMode,
        /// The underlying system-proxy error.
        #[source]
        source: SystemProxyError,
    },

    /// Persisting the mode failed; the transition was not applied.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
