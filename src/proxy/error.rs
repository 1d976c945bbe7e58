//! Error types for the sniff proxy lifecycle.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors from starting or running the sniff proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The intended listening port is already bound by another process.
    ///
    /// Terminal for the start attempt: no retry and no alternate port
    /// search, unlike control-port resolution. Surfaced to the user; the
    /// proxy stays unstarted.
    #[error("Proxy port {port} is already in use by another process")]
    PortInUse {
        /// The occupied port.
        port: u16,
    },

    /// Binding the listener failed for a reason other than the pre-flight
    /// occupancy check.
    #[error("Failed to bind proxy listener on {addr}: {source}")]
    Bind {
        /// The address we tried to bind.
        addr: SocketAddr,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O error from the accept loop.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_in_use_names_the_port() {
        let err = ProxyError::PortInUse { port: 9999 };
        assert!(err.to_string().contains("9999"));
    }
}
