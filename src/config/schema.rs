//! Configuration schema definitions.

use crate::routing::RoutingMode;
use serde::{Deserialize, Serialize};

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Deployment profile. Port conflict resolution only runs under
    /// [`Profile::Production`]; development assumes no collisions.
    #[serde(default)]
    pub profile: Profile,

    /// Listening ports for the embedded services.
    #[serde(default)]
    pub server: ServerConfig,

    /// The active system proxy-routing mode.
    ///
    /// Owned by this file; mutated only through the routing-mode machine,
    /// never written directly by other components.
    #[serde(default)]
    pub routing_mode: RoutingMode,
}

/// Deployment profile.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Development: requested ports are trusted as-is.
    #[default]
    Development,
    /// Production: the control port is probed and moved off collisions.
    Production,
}

/// Listening ports for the control service, the view, and the sniff proxy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port of the control service (serves the PAC script among others).
    #[serde(default = "default_control_port")]
    pub control_port: u16,

    /// Port the view is reachable on. Under the production profile this is
    /// forced equal to the resolved control port.
    #[serde(default = "default_view_port")]
    pub view_port: u16,

    /// Port the sniff proxy listens on. Never searched: a collision here is
    /// surfaced to the user instead of silently moving the proxy.
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            control_port: default_control_port(),
            view_port: default_view_port(),
            proxy_port: default_proxy_port(),
        }
    }
}

fn default_control_port() -> u16 {
    8080
}

fn default_view_port() -> u16 {
    8080
}

fn default_proxy_port() -> u16 {
    9999
}
