//! Interception trust certificate handling.
//!
//! Sniffing encrypted traffic needs the proxy's root certificate in the OS
//! trust store. The check-and-install here is strictly best effort: any
//! failure is logged and startup proceeds. Interception of encrypted
//! traffic then fails at the proxy layer, which is outside this crate.
//!
//! Only Windows carries a real installer (`certutil` against the per-user
//! Root store); other hosts skip the check entirely.

use std::path::Path;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Subject name of the interception root certificate.
pub const CERT_SUBJECT: &str = "proxydown Root CA";

/// Errors from trust store commands.
#[derive(Debug, Error)]
pub enum TrustError {
    /// The trust store command could not be spawned.
    #[error("Failed to run {command}: {source}")]
    Spawn {
        /// The command that failed to start.
        command: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The trust store command ran but reported failure.
    #[error("{command} exited with status {code}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// Its exit code (-1 when terminated without one).
        code: i32,
    },
}

/// Whether this host needs the trust certificate installed for
/// interception to work.
#[must_use]
pub fn platform_requires_certificate() -> bool {
    cfg!(target_os = "windows")
}

/// Whether the interception root certificate is present in the per-user
/// trust store.
pub fn certificate_installed() -> Result<bool, TrustError> {
    let output = Command::new("certutil")
        .args(["-user", "-verifystore", "Root", CERT_SUBJECT])
        .output()
        .map_err(|e| TrustError::Spawn {
            command: "certutil -user -verifystore".to_string(),
            source: e,
        })?;

    Ok(output.status.success())
}

/// Install the root certificate at `cert_path` into the per-user trust
/// store.
pub fn install_certificate(cert_path: &Path) -> Result<(), TrustError> {
    let output = Command::new("certutil")
        .args(["-user", "-addstore", "Root"])
        .arg(cert_path)
        .output()
        .map_err(|e| TrustError::Spawn {
            command: "certutil -user -addstore".to_string(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(TrustError::CommandFailed {
            command: "certutil -user -addstore".to_string(),
            code: output.status.code().unwrap_or(-1),
        });
    }

    Ok(())
}

/// Best-effort check-and-install of the interception certificate.
///
/// Never fails startup: every outcome short of success is logged and
/// swallowed.
pub fn ensure_trust_certificate(cert_path: &Path) {
    if !platform_requires_certificate() {
        debug!(
            "Host does not require an interception trust certificate, skipping"
        );
        return;
    }

    if !cert_path.exists() {
        warn!(
            "Trust certificate bundle not found at {:?}; encrypted traffic will not be sniffed",
            cert_path
        );
        return;
    }

    match certificate_installed() {
        Ok(true) => {
            debug!("Interception trust certificate already installed");
        }
        Ok(false) => match install_certificate(cert_path) {
            Ok(()) => info!("Installed interception trust certificate"),
            Err(e) => error!("Failed to install trust certificate: {}", e),
        },
        Err(e) => error!("Failed to query trust store: {}", e),
    }
}
