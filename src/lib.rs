//! proxydown: startup/lifecycle core for a download-sniffing proxy desktop app
//!
//! This crate brings a local intercepting proxy online as part of a desktop
//! application's startup sequence, keeps exactly one application surface
//! reachable no matter how many times the user re-invokes "show", and
//! maintains an exclusive, persisted choice of how OS-level traffic routing
//! is configured to pass through that proxy.
//!
//! # Architecture
//!
//! - **Ports**: conflict-free resolution of the listening ports, probed
//!   against sockets already bound by other processes
//! - **Proxy**: pre-flight checked, background-task lifecycle for the sniff
//!   proxy, with an event channel for download-worthy transactions
//! - **Routing**: persisted state machine over the three mutually exclusive
//!   system proxy-routing modes and their OS-level effects
//! - **Surface**: single-instance show/hide semantics for the application
//!   surface, fed by an explicit cross-thread command channel
//! - **Config**: TOML configuration persisted in the per-user config dir
//!
//! Traffic inspection itself, window rendering, and the PAC script's routing
//! rules are external collaborators consumed through trait seams.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod app;
pub mod cli;
pub mod config;
pub mod notify;
pub mod ports;
pub mod proxy;
pub mod routing;
pub mod surface;
pub mod trust;
