//! System-level proxy configuration adapters.
//!
//! The routing-mode machine applies its OS effects through the
//! [`SystemProxy`] trait. Per-user WinINET settings are the only routing
//! target with a real adapter; other hosts get [`UnsupportedSystemProxy`],
//! which keeps `Disabled` reachable and reports everything else as
//! unavailable so the mode selector can gray the choices out.

use std::process::Command;

use thiserror::Error;
use tracing::{debug, warn};

/// Errors from system proxy configuration commands.
#[derive(Debug, Error)]
pub enum SystemProxyError {
    /// The configuration command could not be spawned.
    #[error("Failed to run {command}: {source}")]
    Spawn {
        /// The command that failed to start.
        command: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration command ran but reported failure.
    #[error("{command} exited with status {code}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// Its exit code (-1 when terminated without one).
        code: i32,
    },

    /// This host has no system proxy configuration surface.
    #[error("System proxy routing is not supported on {os}")]
    Unsupported {
        /// The host operating system.
        os: &'static str,
    },
}

/// Operating-system proxy configuration, as consumed by the routing-mode
/// machine.
///
/// All operations are synchronous and short-lived; they execute on the
/// calling thread.
pub trait SystemProxy: Send + Sync {
    /// Whether this host can route traffic through the proxy at all.
    ///
    /// When `false`, only clearing the configuration is meaningful.
    fn supported(&self) -> bool;

    /// Route all OS HTTP/HTTPS traffic through `host:port`.
    fn enable_global_route(&self, host: &str, port: u16) -> Result<(), SystemProxyError>;

    /// Point the OS at a PAC script served from `url` for per-request
    /// routing decisions.
    fn enable_pac_route(&self, url: &str) -> Result<(), SystemProxyError>;

    /// Remove any proxy configuration previously installed by this system.
    fn disable_route(&self) -> Result<(), SystemProxyError>;
}

/// The system proxy adapter for the host this process runs on.
#[must_use]
pub fn platform_system_proxy() -> Box<dyn SystemProxy> {
    if cfg!(target_os = "windows") {
        Box::new(WindowsSystemProxy)
    } else {
        Box::new(UnsupportedSystemProxy::new())
    }
}

/// Per-user WinINET proxy settings, driven through `reg`.
///
/// Values live under the user hive, so no elevation is required. New
/// connections pick the settings up; long-lived browser sessions may need a
/// refresh, which is the browser's concern.
pub struct WindowsSystemProxy;

const INTERNET_SETTINGS_KEY: &str =
    r"HKCU\Software\Microsoft\Windows\CurrentVersion\Internet Settings";

impl WindowsSystemProxy {
    fn set_value(&self, name: &str, kind: &str, data: &str) -> Result<(), SystemProxyError> {
        run_reg(&[
            "add",
            INTERNET_SETTINGS_KEY,
            "/v",
            name,
            "/t",
            kind,
            "/d",
            data,
            "/f",
        ])
    }

    /// Delete a value, tolerating its absence.
    fn delete_value(&self, name: &str) {
        if let Err(e) = run_reg(&["delete", INTERNET_SETTINGS_KEY, "/v", name, "/f"]) {
            debug!("Could not delete {} (may not exist): {}", name, e);
        }
    }
}

impl SystemProxy for WindowsSystemProxy {
    fn supported(&self) -> bool {
        true
    }

    fn enable_global_route(&self, host: &str, port: u16) -> Result<(), SystemProxyError> {
        self.set_value("ProxyServer", "REG_SZ", &format!("{host}:{port}"))?;
        self.set_value("ProxyEnable", "REG_DWORD", "1")?;
        // A lingering PAC URL would take precedence over the static proxy.
        self.delete_value("AutoConfigURL");
        debug!("Enabled global proxy route via {}:{}", host, port);
        Ok(())
    }

    fn enable_pac_route(&self, url: &str) -> Result<(), SystemProxyError> {
        self.set_value("AutoConfigURL", "REG_SZ", url)?;
        self.set_value("ProxyEnable", "REG_DWORD", "0")?;
        debug!("Enabled PAC proxy route via {}", url);
        Ok(())
    }

    fn disable_route(&self) -> Result<(), SystemProxyError> {
        self.set_value("ProxyEnable", "REG_DWORD", "0")?;
        self.delete_value("AutoConfigURL");
        debug!("Disabled system proxy route");
        Ok(())
    }
}

/// Adapter for hosts without a supported proxy configuration surface.
pub struct UnsupportedSystemProxy {
    os: &'static str,
}

impl UnsupportedSystemProxy {
    /// Create an adapter reporting the current host OS.
    #[must_use]
    pub fn new() -> Self {
        Self {
            os: std::env::consts::OS,
        }
    }
}

impl Default for UnsupportedSystemProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProxy for UnsupportedSystemProxy {
    fn supported(&self) -> bool {
        false
    }

    fn enable_global_route(&self, _host: &str, _port: u16) -> Result<(), SystemProxyError> {
        Err(SystemProxyError::Unsupported { os: self.os })
    }

    fn enable_pac_route(&self, _url: &str) -> Result<(), SystemProxyError> {
        Err(SystemProxyError::Unsupported { os: self.os })
    }

    fn disable_route(&self) -> Result<(), SystemProxyError> {
        // Nothing was ever installed here, so clearing succeeds trivially.
        // This keeps the Disabled mode reachable on every host.
        debug!("disable_route is a no-op on {}", self.os);
        Ok(())
    }
}

fn run_reg(args: &[&str]) -> Result<(), SystemProxyError> {
    let rendered = format!("reg {}", args.join(" "));
    let output = Command::new("reg")
        .args(args)
        .output()
        .map_err(|e| SystemProxyError::Spawn {
            command: rendered.clone(),
            source: e,
        })?;

    if !output.status.success() {
        warn!(
            "{} failed: {}",
            rendered,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Err(SystemProxyError::CommandFailed {
            command: rendered,
            code: output.status.code().unwrap_or(-1),
        });
    }

    Ok(())
}
