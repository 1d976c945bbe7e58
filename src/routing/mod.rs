//! System proxy-routing mode machine.
//!
//! Exactly one of three mutually exclusive modes holds at any time:
//! traffic routing disabled, everything routed through the sniff proxy, or
//! selective routing through a PAC script served by the control service.
//! The active mode is owned by persisted configuration and mutated only
//! through [`RoutingModeMachine::select`].
//!
//! A transition persists the new mode first and applies the OS effect
//! second. When the effect fails the persisted value is deliberately left
//! as the attempted mode and the error is surfaced to the caller; startup
//! re-applies whatever mode is persisted, so the OS state converges on the
//! next successful application.

mod error;
mod system;

pub use error::RoutingError;
pub use system::{
    platform_system_proxy, SystemProxy, SystemProxyError, UnsupportedSystemProxy,
    WindowsSystemProxy,
};

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{AppConfig, ConfigLoader};
use crate::ports::PortPlan;

/// Loopback host the OS proxy configuration points at.
const LOOPBACK_HOST: &str = "127.0.0.1";

/// How OS traffic is routed through the sniff proxy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// No system-level proxy configuration installed.
    #[default]
    Disabled,
    /// All OS HTTP/HTTPS traffic routed through the proxy.
    GlobalRoute,
    /// Only traffic matched by the PAC script routed through the proxy.
    SelectiveRoute,
}

impl RoutingMode {
    /// All modes, in mode-selector order.
    pub const ALL: [RoutingMode; 3] = [
        RoutingMode::GlobalRoute,
        RoutingMode::SelectiveRoute,
        RoutingMode::Disabled,
    ];

    /// Short human-readable name.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            RoutingMode::Disabled => "disabled",
            RoutingMode::GlobalRoute => "global",
            RoutingMode::SelectiveRoute => "selective (PAC)",
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of the mode selector.
///
/// Non-capable hosts still list every mode; unavailable ones are carried
/// with `enabled: false` so the selector presents a disabled choice rather
/// than omitting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeItem {
    /// The mode this entry selects.
    pub mode: RoutingMode,
    /// Whether this is the active mode.
    pub selected: bool,
    /// Whether this mode can be selected on this host.
    pub enabled: bool,
}

/// The persisted, exclusive routing-mode state machine.
///
/// Owns the configuration after startup; transitions are user-initiated and
/// total (any mode to any other, self-transitions included).
pub struct RoutingModeMachine {
    system: Box<dyn SystemProxy>,
    loader: ConfigLoader,
    config: AppConfig,
    plan: PortPlan,
}

impl RoutingModeMachine {
    /// Create a machine seeded from the persisted mode in `config`.
    ///
    /// No OS effect is applied yet; call [`apply_current`] once startup is
    /// far enough along to surface failures.
    ///
    /// [`apply_current`]: RoutingModeMachine::apply_current
    pub fn new(
        system: Box<dyn SystemProxy>,
        loader: ConfigLoader,
        config: AppConfig,
        plan: PortPlan,
    ) -> Self {
        Self {
            system,
            loader,
            config,
            plan,
        }
    }

    /// The currently persisted mode.
    #[must_use]
    pub fn current(&self) -> RoutingMode {
        self.config.routing_mode
    }

    /// Whether this host supports proxy routing at the OS level.
    #[must_use]
    pub fn os_supported(&self) -> bool {
        self.system.supported()
    }

    /// Mode-selector entries for the tray menu.
    #[must_use]
    pub fn menu_items(&self) -> Vec<ModeItem> {
        let supported = self.os_supported();
        RoutingMode::ALL
            .into_iter()
            .map(|mode| ModeItem {
                mode,
                selected: mode == self.current(),
                enabled: mode == RoutingMode::Disabled || supported,
            })
            .collect()
    }

    /// Transition to `mode`.
    ///
    /// Persists the new mode, then applies its OS effect. Re-entering the
    /// current mode re-applies the effect and is not an error. On effect
    /// failure the persisted mode is left as the attempted value; the
    /// caller notifies the user.
    pub fn select(&mut self, mode: RoutingMode) -> Result<(), RoutingError> {
        info!("Switching routing mode: {} -> {}", self.current(), mode);

        self.config.routing_mode = mode;
        self.loader.save(&self.config)?;

        self.apply(mode)
    }

    /// Re-apply the persisted mode's OS effect.
    ///
    /// Called at startup: the OS state is not assumed to have survived a
    /// previous unclean shutdown.
    pub fn apply_current(&self) -> Result<(), RoutingError> {
        self.apply(self.current())
    }

    /// Best-effort teardown: remove the OS proxy configuration without
    /// touching the persisted mode, so the next start re-applies it.
    pub fn clear_os_route(&self) {
        if let Err(e) = self.system.disable_route() {
            warn!("Failed to clear system proxy route on shutdown: {}", e);
        }
    }

    fn apply(&self, mode: RoutingMode) -> Result<(), RoutingError> {
        let result = match mode {
            RoutingMode::Disabled => self.system.disable_route(),
            RoutingMode::GlobalRoute => self
                .system
                .enable_global_route(LOOPBACK_HOST, self.plan.proxy_port),
            RoutingMode::SelectiveRoute => {
                self.system.enable_pac_route(&pac_url(self.plan.control_port))
            }
        };

        result.map_err(|source| RoutingError::EffectFailed { mode, source })
    }
}

/// URL of the PAC script served by the control service.
///
/// Carries a millisecond timestamp as a cache-busting query parameter so
/// the OS re-fetches the script after every mode switch.
pub(crate) fn pac_url(control_port: u16) -> String {
    format!(
        "http://{}:{}/res/pd.pac?t={}",
        LOOPBACK_HOST,
        control_port,
        Utc::now().timestamp_millis()
    )
}
