//! Persisted configuration for proxydown.
//!
//! Configuration lives in a single TOML file in the per-user config
//! directory (`~/.config/proxydown/config.toml` on Linux). A missing file is
//! not an error: defaults are used and written back on the first save.
//!
//! Two writers exist, both on the startup/UI path:
//!
//! - port resolution writes the resolved control/view ports once at startup
//! - the routing-mode machine writes the selected mode on every transition
//!
//! Last write wins; UI interaction is serialized by the single surface, so
//! no locking is applied.

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{AppConfig, Profile, ServerConfig};
