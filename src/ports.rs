//! Listening-port resolution.
//!
//! At startup the control port is probed against sockets already bound by
//! other processes. Under the production profile a conflict moves the
//! control service to the smallest free port above the requested one, and
//! the view is served from that same port; the resolved values are written
//! back to persisted configuration so subsequent reads stay stable for the
//! rest of the process lifetime.
//!
//! The sniff proxy port is deliberately *not* resolved here: a collision on
//! it is a user-facing condition handled by the proxy lifecycle instead of
//! being silently moved (browsers and the PAC script point at it).

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{AppConfig, ConfigLoader, Profile};

/// Errors from port resolution.
#[derive(Debug, Error)]
pub enum PortError {
    /// The ascending scan ran out of valid ports.
    #[error("No free port found scanning upward from {0}")]
    NoFreePortFound(u16),

    /// Writing the resolved ports back to configuration failed.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// The listening ports resolved for this process, immutable after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPlan {
    /// Port the sniff proxy listens on.
    pub proxy_port: u16,
    /// Port of the control service.
    pub control_port: u16,
    /// Port the view is reachable on.
    pub view_port: u16,
}

/// Whether another socket is already bound to `port` on loopback.
///
/// Probes by attempting a bind and releasing it immediately; never leaves a
/// socket behind.
#[must_use]
pub fn port_in_use(port: u16) -> bool {
    TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)).is_err()
}

/// Find the smallest free port at or above `start`.
pub fn find_free_port(start: u16) -> Result<u16, PortError> {
    let mut port = start;
    loop {
        if !port_in_use(port) {
            return Ok(port);
        }
        port = port
            .checked_add(1)
            .ok_or(PortError::NoFreePortFound(start))?;
    }
}

/// Resolve the listening ports for this run.
///
/// Development profile: the configured ports are used unmodified. Production
/// profile: the control port is probed; on a conflict the smallest free port
/// above it is chosen, the view port is forced equal to the control port,
/// and both are persisted.
pub fn resolve_ports(loader: &ConfigLoader, config: &mut AppConfig) -> Result<PortPlan, PortError> {
    if config.profile != Profile::Production {
        debug!("Development profile, using configured ports unmodified");
        return Ok(PortPlan {
            proxy_port: config.server.proxy_port,
            control_port: config.server.control_port,
            view_port: config.server.view_port,
        });
    }

    let requested = config.server.control_port;
    let control_port = if port_in_use(requested) {
        let next = requested
            .checked_add(1)
            .ok_or(PortError::NoFreePortFound(requested))?;
        let moved = find_free_port(next)?;
        info!(
            "Control port {} is taken by another process, moving to {}",
            requested, moved
        );
        moved
    } else {
        requested
    };

    // The view is served from the control port in production.
    config.server.control_port = control_port;
    config.server.view_port = control_port;
    loader.save(config)?;

    Ok(PortPlan {
        proxy_port: config.server.proxy_port,
        control_port,
        view_port: control_port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn temp_loader() -> (tempfile::TempDir, ConfigLoader) {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_path(dir.path().join("config.toml"));
        (dir, loader)
    }

    /// Bind an ephemeral port and keep the listener alive so the port stays
    /// occupied for the duration of the test.
    fn occupied_port() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn occupied_port_is_reported_in_use() {
        let (_guard, port) = occupied_port();
        assert!(port_in_use(port));
    }

    #[test]
    fn probe_does_not_leave_the_port_bound() {
        let (_guard, port) = occupied_port();
        drop(_guard);
        assert!(!port_in_use(port));
        // A second probe still finds it free.
        assert!(!port_in_use(port));
    }

    #[test]
    fn find_free_port_skips_occupied_ports() {
        let (_guard, port) = occupied_port();
        let found = find_free_port(port).unwrap();
        assert!(found > port);
        assert!(!port_in_use(found));
    }

    #[test]
    fn development_profile_trusts_configured_ports() {
        let (_dir, loader) = temp_loader();
        let (_guard, taken) = occupied_port();

        let mut config = AppConfig::default();
        config.server.control_port = taken;
        config.server.view_port = taken;

        // Even an occupied port passes through untouched in development.
        let plan = resolve_ports(&loader, &mut config).unwrap();
        assert_eq!(plan.control_port, taken);
        assert_eq!(plan.view_port, taken);
        assert!(!loader.path().exists(), "development must not write config");
    }

    #[test]
    fn production_keeps_a_free_control_port() {
        let (_dir, loader) = temp_loader();

        // Grab a port that is free right now.
        let free = {
            let (guard, port) = occupied_port();
            drop(guard);
            port
        };

        let mut config = AppConfig {
            profile: Profile::Production,
            ..AppConfig::default()
        };
        config.server.control_port = free;

        let plan = resolve_ports(&loader, &mut config).unwrap();
        assert_eq!(plan.control_port, free);
        assert_eq!(plan.view_port, free);
    }

    #[test]
    fn production_moves_off_an_occupied_control_port() {
        let (_dir, loader) = temp_loader();
        let (_guard, taken) = occupied_port();

        let mut config = AppConfig {
            profile: Profile::Production,
            ..AppConfig::default()
        };
        config.server.control_port = taken;
        config.server.view_port = taken;

        let plan = resolve_ports(&loader, &mut config).unwrap();
        assert!(plan.control_port > taken);
        assert!(!port_in_use(plan.control_port));
        assert_eq!(plan.view_port, plan.control_port);

        // The resolved ports are persisted for the rest of the process
        // lifetime and for the control service to read.
        let reloaded = loader.load().unwrap();
        assert_eq!(reloaded.server.control_port, plan.control_port);
        assert_eq!(reloaded.server.view_port, plan.control_port);
    }

    #[test]
    fn proxy_port_is_never_searched() {
        let (_dir, loader) = temp_loader();
        let (_guard, taken) = occupied_port();

        let mut config = AppConfig {
            profile: Profile::Production,
            ..AppConfig::default()
        };
        config.server.proxy_port = taken;

        let plan = resolve_ports(&loader, &mut config).unwrap();
        assert_eq!(plan.proxy_port, taken);
    }
}
